mod participant;
mod room;
mod stt_session;
mod transcript;
mod work_queue;
mod worker;

pub use participant::*;
pub use room::*;
pub use stt_session::*;
pub use transcript::*;
pub use work_queue::*;
pub use worker::*;
