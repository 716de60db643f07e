// File- and env-backed defaults for the external collaborator interfaces

pub mod settings;
pub mod signature_store;
pub mod upstream_map;
