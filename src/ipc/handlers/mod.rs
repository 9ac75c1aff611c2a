pub mod commentary;
pub mod core;
pub mod feedback;
pub mod history;
pub mod roster;
pub mod submissions;
