use std::path::PathBuf;

use clap::Parser;

/// Keep one container running the latest build of an image.
#[derive(Parser, Debug, Default)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Image to deploy, as `repository[:tag]`.
    pub image: Option<String>,

    /// Name of the managed container.
    #[arg(short, long)]
    pub name: Option<String>,

    /// Network mode passed to the runtime (default: bridge).
    #[arg(long)]
    pub network: Option<String>,

    /// Volume bind, `source:target[:mode]`. May be repeated.
    #[arg(short, long = "volume")]
    pub volumes: Vec<String>,

    /// Environment variable, `KEY=VALUE`. May be repeated.
    #[arg(short, long = "env")]
    pub env: Vec<String>,

    /// Run the container detached. Required.
    #[arg(short, long)]
    pub detach: bool,

    /// Allocate a pseudo-TTY.
    #[arg(short, long)]
    pub tty: bool,

    /// Restart policy: `always` or `image-push`. May be repeated.
    #[arg(long)]
    pub restart: Vec<String>,

    /// Registry identity token used when pulling.
    #[arg(long, env = "REDOCK_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Optional TOML file with the same settings. Command line values win.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
