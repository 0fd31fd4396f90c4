use crate::{Board, BoardError, Generic, Msm};
use alloc::string::ToString;

static BOARDS: &[&dyn Board] = &[
    &Generic,
    &Msm::HAMMERHEAD,
    &Msm::BACON,
    &Msm::M8,
    &Msm::D851,
    &Msm::SHAMU,
];

/// Look up a board by exact name.
///
/// # Errors
/// [`BoardError::Unknown`] if no board carries the name.
pub fn find_board(name: &str) -> Result<&'static dyn Board, BoardError> {
    BOARDS
        .iter()
        .copied()
        .find(|board| board.names().contains(&name))
        .ok_or_else(|| BoardError::Unknown(name.to_string()))
}

/// All registered board names in registry order.
pub fn board_names() -> impl Iterator<Item = &'static str> {
    BOARDS.iter().flat_map(|board| board.names().iter().copied())
}
