use clap::Parser;

/// A desktop automation agent: watches the screen, drives mouse/keyboard,
/// and talks back over chat, an overlay, or mail.
#[derive(Parser, Debug)]
#[command(name = "deskagent")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The task to hand the agent. Omit for interactive mode.
    #[arg(value_name = "TASK")]
    pub task: Option<String>,

    /// Verbose tool-call logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Disable the overlay socket server.
    #[arg(long)]
    pub no_ui: bool,

    /// Never exit autonomously; keep waiting for more input after finishing.
    #[arg(short, long)]
    pub interactive: bool,

    /// Purge queued inbound/outbound messages before starting.
    #[arg(long)]
    pub clear: bool,

    /// Provider name (sets api base, key env alias, and default model).
    #[arg(short, long, value_name = "NAME")]
    pub provider: Option<String>,

    /// Shorthand for `--provider openai`.
    #[arg(long)]
    pub openai: bool,

    /// Shorthand for `--provider anthropic`.
    #[arg(long)]
    pub anthropic: bool,
}

impl Cli {
    /// Resolve `--provider`/shorthand flags down to one provider name, if any.
    pub fn provider_name(&self) -> Option<String> {
        if let Some(p) = &self.provider {
            return Some(p.clone());
        }
        if self.openai {
            return Some("openai".to_string());
        }
        if self.anthropic {
            return Some("anthropic".to_string());
        }
        None
    }
}
