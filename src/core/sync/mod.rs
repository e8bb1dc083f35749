/*!
 * Synchronization Primitives
 *
 * Correlation structures shared between the network receive path and the
 * orchestration tasks waiting on it.
 */

mod waitmap;

pub use waitmap::{deadline_after, WaitMap};
