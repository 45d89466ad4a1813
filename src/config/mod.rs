pub mod loader;
pub mod schema;
pub mod version;

pub use loader::{
    discover_catalog_files, load_catalogs, load_from_path, load_from_str,
    sed_to_regex_template, Catalog, ConfigError,
};
pub use schema::{
    CatalogFile, Metadata, ModuleDefinition, OperationDefinition, ReplacementSyntax,
    ValidationError, ValidationIssue,
};
pub use version::{
    check_catalog_version, detect_version, matches_requirement, VersionCheck, VersionError,
};
