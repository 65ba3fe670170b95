use crate::grid::Grid;

/// Receives intermediate rasters as the pipeline produces them.
///
/// Passed explicitly to each stage; stages skip all diagnostic work when no
/// sink is supplied.
pub trait Diagnostics {
    fn layer(&mut self, name: &str, grid: &Grid);
}

/// Collects every reported layer, in the order the pipeline produced them.
#[derive(Debug, Default, Clone)]
pub struct LayerStack {
    layers: Vec<(String, Grid)>,
}

impl LayerStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Grid> {
        self.layers.iter().find(|(n, _)| n == name).map(|(_, g)| g)
    }

    pub fn into_layers(self) -> Vec<(String, Grid)> {
        self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl Diagnostics for LayerStack {
    fn layer(&mut self, name: &str, grid: &Grid) {
        self.layers.push((name.to_string(), grid.clone()));
    }
}

/// Forwards a layer to an optional sink.
pub(crate) fn emit(sink: &mut Option<&mut dyn Diagnostics>, name: &str, grid: &Grid) {
    if let Some(sink) = sink.as_deref_mut() {
        sink.layer(name, grid);
    }
}

/// Shortens a borrowed sink so it can be handed to a nested stage and used
/// again afterwards.
pub(crate) fn reborrow<'a>(
    sink: &'a mut Option<&mut dyn Diagnostics>,
) -> Option<&'a mut dyn Diagnostics> {
    match sink {
        Some(sink) => Some(&mut **sink),
        None => None,
    }
}
