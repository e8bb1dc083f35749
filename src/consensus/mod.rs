/*!
 * Consensus
 * Client-side helpers for consensus clusters
 */

pub mod pbft;
