pub(crate) mod infra;
pub(crate) mod materialize;
pub(crate) mod upgrade;
