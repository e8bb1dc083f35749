/*!
 * Roll Call
 * Recruiting worker nodes for an execution
 */

mod protocol;
mod queue;

pub use queue::{RollCallQueue, RollCallReply};
