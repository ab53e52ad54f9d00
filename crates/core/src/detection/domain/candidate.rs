use crate::shared::color::Rgb;
use crate::shared::region::Region;

/// One region reported by one registry entry for one frame.
///
/// `order_index` is the entry's position in the registry. It only breaks
/// ties during arbitration and never contributes to a score.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub label: String,
    pub caption: String,
    pub color: Rgb,
    pub region: Region,
    pub order_index: usize,
}
