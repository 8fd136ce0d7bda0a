//! Engine components: registry, roll, ballot box, tally, publisher
//!
//! Each component exclusively owns one slice of state. The role-gated
//! [`ElectionService`] facade composes them and is the intended public
//! surface; the components themselves are exported for embedders that
//! want to wire their own topology.

pub mod ballot_box;
pub mod publisher;
pub mod registry;
pub mod roll;
pub mod service;
pub mod tally;

pub use ballot_box::BallotBox;
pub use publisher::ResultsPublisher;
pub use registry::ElectionRegistry;
pub use roll::VoterRoll;
pub use service::ElectionService;
pub use tally::TallyEngine;
