use clap::Parser;
use gdbsession::config::SessionConfig;
use gdbsession::debugger::command::TextEncoding;
use gdbsession::ui::console::TerminalApplication;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Debugger executable, a path or a program name from PATH
    #[arg(long, env = "GDBS_DEBUGGER")]
    debugger: Option<String>,

    /// Configuration file [default: ~/.config/gdbs/config.toml]
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use UTF-8 on debugger pipes instead of the local 8-bit encoding
    #[arg(long)]
    utf8: bool,

    /// Program to debug
    program: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = SessionConfig::load(args.config.as_deref())?;
    if let Some(debugger) = args.debugger {
        config.debugger = Some(debugger);
    }
    if args.utf8 {
        config.encoding = TextEncoding::Utf8;
    }

    let app = TerminalApplication::new(config, args.program)?;
    app.run()
}
