mod compose;
mod inbox;

pub use compose::compose;
pub use inbox::read_inbox;
