pub mod call_end;
pub mod session;
pub mod token;

pub use call_end::CallEndDetector;
pub use session::RoomSession;
