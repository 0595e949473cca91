use std::env;
use std::io;

use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use sgpt_core::function::{
    Error as FunctionError, Function, FunctionResult, ModelFunction,
};
use tokio::process::Command;

#[derive(Deserialize, JsonSchema)]
pub struct ExecuteShellCommandArguments {
    #[schemars(description = "Shell command to execute.")]
    shell_command: String,
}

/// Runs a command line with the user's shell.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExecuteShellCommand;

impl Function for ExecuteShellCommand {
    type Arguments = ExecuteShellCommandArguments;

    fn definition(&self) -> ModelFunction {
        ModelFunction {
            name: "execute_shell_command".to_owned(),
            description: "Executes a shell command and returns the output \
                          (result)."
                .to_owned(),
            parameters: schema_for!(ExecuteShellCommandArguments).to_value(),
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn call(
        &self,
        arguments: ExecuteShellCommandArguments,
    ) -> impl Future<Output = FunctionResult> + Send + 'static {
        async move {
            run_command_line(&arguments.shell_command).await.map_err(|err| {
                FunctionError::execution_error().with_reason(format!("{err}"))
            })
        }
    }
}

#[inline]
fn create_command_with_inferred_shell() -> Command {
    let Some(shell) = env::var_os("SHELL") else {
        return Command::new("/bin/sh");
    };
    Command::new(shell)
}

async fn run_command_line(cmdline: &str) -> Result<String, io::Error> {
    debug!("running shell command: {cmdline}");
    let output = create_command_with_inferred_shell()
        .arg("-c")
        .arg(cmdline)
        .output()
        .await?;

    let exit_code = output
        .status
        .code()
        .map_or_else(|| "none".to_owned(), |code| code.to_string());
    let mut result = format!("Exit code: {exit_code}, Output:\n");
    result.push_str(&String::from_utf8_lossy(&output.stdout));
    result.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(result)
}
