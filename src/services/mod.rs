pub mod depot_service;
pub mod metadata_store;
pub mod object_downloader;
pub mod url_resolver;
