use thiserror::Error;

/// Failures of the cell-closing stage.
///
/// Both indicate that the bounding box does not properly enclose the
/// finite Voronoi structure, or that a numerical degeneracy survived
/// upstream (e.g. unquantized near-coincident sites). The computation
/// is abandoned; no partial diagram is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// An open cell boundary endpoint lies on no side of the bounding
    /// box, so the border walk cannot even start.
    #[error("cell {cell}: open boundary endpoint lies on no side of the bounding box")]
    InconsistentCell { cell: usize },

    /// The border walk wrapped the bounding box without meeting the
    /// far end of the gap.
    #[error("cell {cell}: could not close the cell within the bounding box")]
    UnclosedCell { cell: usize },
}
