use std::io::{self, Write};
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use ollama_relay::services::{
    chat_session::{ChatSession, DEFAULT_SYSTEM_PROMPT, Settings},
    relay_client::{DEFAULT_BACKEND_URL, RelayClient},
};

#[derive(Parser, Debug)]
#[command(name = "chat", about = "Terminal chat client for the Ollama relay")]
struct Args {
    /// Relay base URL
    #[arg(long, env = "BACKEND_URL", default_value = DEFAULT_BACKEND_URL)]
    backend_url: String,

    #[arg(long, default_value = DEFAULT_SYSTEM_PROMPT)]
    system_prompt: String,

    /// Sampling temperature, 0.0 to 1.0
    #[arg(long, default_value_t = 0.7)]
    temperature: f32,

    #[arg(long, default_value_t = 512)]
    max_tokens: i64,

    /// Model to request; defaults to the first one the relay lists
    #[arg(long)]
    model: Option<String>,

    /// Seconds between health polls while the relay is not ready
    #[arg(long, default_value_t = 2)]
    poll_secs: u64,
}

#[derive(Debug, PartialEq)]
enum Command<'a> {
    Reset,
    Models,
    Model(&'a str),
    System(&'a str),
    Help,
    Quit,
    Say(&'a str),
    Nothing,
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Nothing;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Command::Say(line);
        };
        let (name, arg) = rest.split_once(' ').unwrap_or((rest, ""));
        match (name, arg.trim()) {
            ("reset" | "clear", _) => Command::Reset,
            ("models", _) => Command::Models,
            ("model", m) if !m.is_empty() => Command::Model(m),
            ("system", s) if !s.is_empty() => Command::System(s),
            ("quit" | "exit", _) => Command::Quit,
            _ => Command::Help,
        }
    }
}

/// Prints fragments as they arrive. The first write failure is kept and later
/// fragments are dropped, so the caller can surface it once the turn ends.
struct Echo<W: Write> {
    out: W,
    failed: Option<io::Error>,
}

impl<W: Write> Echo<W> {
    fn new(out: W) -> Self {
        Self { out, failed: None }
    }

    fn fragment(&mut self, text: &str) {
        if self.failed.is_some() {
            return;
        }
        if let Err(e) = self.out.write_all(text.as_bytes()).and_then(|()| self.out.flush()) {
            self.failed = Some(e);
        }
    }

    fn finish(self) -> io::Result<()> {
        self.failed.map_or(Ok(()), Err)
    }
}

const HELP: &str = "commands: /reset  /models  /model <name>  /system <prompt>  /help  /quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    ollama_relay::init_tracing("warn");

    let args = Args::parse();
    let relay = RelayClient::new(&args.backend_url)?;
    let mut session = ChatSession::new(
        relay,
        Settings {
            system_prompt: args.system_prompt,
            temperature: args.temperature,
            max_tokens: args.max_tokens,
            model: args.model,
        },
    );

    wait_until_ready(&mut session, Duration::from_secs(args.poll_secs.max(1))).await;
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match Command::parse(&line) {
            Command::Nothing => {}
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
            Command::Reset => {
                session.reset();
                println!("conversation cleared");
            }
            Command::Models => {
                session.refresh().await;
                let current = session.settings().model.clone().unwrap_or_default();
                for m in session.models() {
                    let marker = if *m == current { "*" } else { " " };
                    println!("{marker} {m}");
                }
            }
            Command::Model(name) => {
                if session.select_model(name) {
                    println!("using model {name}");
                } else {
                    println!("unknown model {name:?}; see /models");
                }
            }
            Command::System(prompt) => {
                session.settings_mut().system_prompt = prompt.to_string();
                println!("system prompt updated");
            }
            Command::Say(prompt) => {
                if !session.is_ready() && !session.refresh().await.ready {
                    println!("relay is not ready; try again shortly");
                    continue;
                }
                let mut echo = Echo::new(io::stdout());
                let result = session
                    .send_turn(prompt, |fragment, _so_far| echo.fragment(fragment))
                    .await;
                echo.finish()?;
                println!();
                if let Err(e) = result {
                    eprintln!("error: {e}");
                    session.refresh().await;
                }
            }
        }
    }

    Ok(())
}

async fn wait_until_ready(session: &mut ChatSession, interval: Duration) {
    loop {
        let readiness = session.refresh().await;
        if readiness.ready {
            let model = session.settings().model.as_deref().unwrap_or("default");
            println!("relay ready, model: {model}");
            return;
        }
        let detail = readiness.detail.clone().unwrap_or_else(|| "no models available".to_string());
        println!("waiting for relay: {detail}");
        tokio::time::sleep(interval).await;
    }
}
