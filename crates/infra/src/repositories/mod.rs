mod memory;
mod surreal;

pub use memory::*;
pub use surreal::*;

pub(crate) const COLLABORATOR_GRANTS_TOTAL: &str = "sambung_infra_collaborator_grants_total";
