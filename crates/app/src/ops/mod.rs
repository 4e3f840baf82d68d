pub mod cat;
pub mod chmod;
pub mod config;
pub mod containers;
pub mod ln;
pub mod ls;
pub mod mkdir;
pub mod mv;
pub mod put;
pub mod rm;
pub mod stat;
pub mod truncate;
pub mod version;
pub mod write;

pub use cat::Cat;
pub use chmod::Chmod;
pub use config::Config;
pub use containers::Containers;
pub use ln::Ln;
pub use ls::Ls;
pub use mkdir::Mkdir;
pub use mv::Mv;
pub use put::Put;
pub use rm::Rm;
pub use stat::Stat;
pub use truncate::Truncate;
pub use version::Version;
pub use write::Write;
