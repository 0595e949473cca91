//! A command-line assistant built on `sgpt` as a library.

#[macro_use]
extern crate tracing;

use std::io::{self, IsTerminal, Read};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use owo_colors::OwoColorize;
use sgpt::core::printer::parse_color;
use sgpt::core::{ConfigBuilder, HandleOptions, Handler, Role, TextPrinter};
use sgpt::functions::builtin_functions;
use sgpt_openai_model::{OpenAIConfigBuilder, OpenAIProvider};

/// Ask a chat completion model from your terminal.
#[derive(Parser)]
#[command(name = "sgpt")]
#[command(about = "A command-line productivity tool powered by chat models")]
struct Args {
    /// The prompt. Text piped through stdin is put before it.
    prompt: Option<String>,

    /// Model to use, defaults to `DEFAULT_MODEL`
    #[arg(long)]
    model: Option<String>,

    /// Randomness of the output
    #[arg(long, default_value_t = 0.0)]
    temperature: f32,

    /// Limits the highest probable tokens
    #[arg(long, default_value_t = 1.0)]
    top_p: f32,

    /// Neither read nor write the response cache
    #[arg(long)]
    no_cache: bool,

    /// Print the answer once it is complete
    #[arg(long)]
    no_stream: bool,

    /// Don't offer functions to the model
    #[arg(long)]
    no_functions: bool,

    /// Generate a shell command
    #[arg(short, long, group = "role_flag")]
    shell: bool,

    /// Describe a shell command
    #[arg(short, long, group = "role_flag")]
    describe_shell: bool,

    /// Generate only code
    #[arg(short, long, group = "role_flag")]
    code: bool,

    /// Use a built-in role by name
    #[arg(long, group = "role_flag")]
    role: Option<String>,

    /// API key of the service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Base URL of the service
    #[arg(long, env = "OPENAI_BASE_URL")]
    base_url: Option<String>,
}

impl Args {
    fn role(&self) -> Option<Role> {
        if self.shell {
            return Some(Role::Shell);
        }
        if self.describe_shell {
            return Some(Role::DescribeShell);
        }
        if self.code {
            return Some(Role::Code);
        }
        match &self.role {
            Some(name) => Role::builtin(name),
            None => Some(Role::Default),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let mut config = ConfigBuilder::from_env();
    if args.no_stream {
        config = config.with_disable_streaming(true);
    }
    let config = config.build();
    debug!("loaded config: {config:?}");

    let Some(role) = args.role() else {
        eprintln!("{}", "unknown role".bright_red());
        return ExitCode::FAILURE;
    };

    let prompt = match read_prompt(args.prompt.as_deref()) {
        Ok(prompt) if !prompt.trim().is_empty() => prompt,
        Ok(_) => {
            eprintln!("{}", "a prompt is required".bright_red());
            return ExitCode::FAILURE;
        }
        Err(err) => {
            error!("error reading input: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut provider_config = OpenAIConfigBuilder::with_api_key(&args.api_key)
        .with_timeout(config.request_timeout());
    if let Some(base_url) = &args.base_url {
        provider_config = provider_config.with_base_url(base_url);
    }
    let provider = OpenAIProvider::new(provider_config.build());

    let handler = Handler::from_config(
        provider,
        Arc::new(builtin_functions()),
        role,
        &config,
    );
    let options = HandleOptions {
        temperature: args.temperature,
        top_p: args.top_p,
        caching: !args.no_cache,
        functions: !args.no_functions,
        ..HandleOptions::new(args.model.as_deref().unwrap_or(config.default_model()))
    };

    let color = config.default_color().and_then(|name| {
        let color = parse_color(name);
        if color.is_none() {
            warn!("unknown color `{name}`, printing without color");
        }
        color
    });
    let mut printer = TextPrinter::new(io::stdout())
        .with_color(color)
        .with_live(!config.disable_streaming());

    match handler.handle(&prompt, &options, &mut printer).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", err.bright_red());
            ExitCode::FAILURE
        }
    }
}

fn read_prompt(arg: Option<&str>) -> io::Result<String> {
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(arg.unwrap_or_default().to_owned());
    }
    let mut piped = String::new();
    stdin.read_to_string(&mut piped)?;
    Ok(match arg {
        Some(arg) => format!("{piped}\n\n{arg}"),
        None => piped,
    })
}
