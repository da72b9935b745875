pub mod packet;
pub use packet::*;

pub mod task;
pub use task::*;

pub mod fsm;
pub use fsm::*;

pub mod fuzz;
pub use fuzz::*;

pub mod session;
pub use session::*;

pub mod proto;
pub use proto::*;
