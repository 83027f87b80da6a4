pub mod check;
pub mod runtime;
pub mod serve;
pub mod token;

pub use check::{cmd_check_config, CheckConfigArgs};
pub use runtime::{init_logging, load_config, LoadedConfig};
pub use serve::{cmd_serve, ServeArgs};
pub use token::{cmd_mint_token, MintTokenArgs};
