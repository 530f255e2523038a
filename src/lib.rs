pub mod warn;
pub mod io_util;
pub mod config;
pub mod json_path;
pub mod fixtures;
pub mod context;
pub mod transport;
pub mod api;
pub mod sequencer;
pub mod template;
pub mod target;
pub mod renderer;
pub mod registry;
pub mod page;
pub mod model_store;
pub mod accesslog;
pub mod api_server;
