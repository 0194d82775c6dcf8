//! Bitcoin / Lightning newtypes.

/// `Amount` msat newtype.
pub mod amount;
/// An amount, or "all".
pub mod amount_or_all;
/// Feature bit vectors.
pub mod features;
/// Node identities.
pub mod node_id;
/// Short channel ids and channel directions.
pub mod scid;
