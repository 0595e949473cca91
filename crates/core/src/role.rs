//! Role policies.

use std::env;
use std::path::Path;

/// The persona the model is asked to take for an exchange.
///
/// Besides the system instructions, a role decides whether the model may
/// call functions at all: roles whose output is meant to be consumed
/// verbatim (a command, a code snippet) never do.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Role {
    /// General purpose assistant for programming and system
    /// administration.
    #[default]
    Default,
    /// Answers with a single shell command and nothing else.
    Shell,
    /// Explains a shell command.
    DescribeShell,
    /// Answers with code only.
    Code,
    /// A user-defined role.
    Custom {
        /// Name of the role.
        name: String,
        /// The system instructions.
        instructions: String,
    },
}

impl Role {
    /// Looks up a built-in role by its name.
    pub fn builtin(name: &str) -> Option<Self> {
        let role = match name {
            "ShellGPT" | "default" => Self::Default,
            "Shell Command Generator" | "shell" => Self::Shell,
            "Shell Command Descriptor" | "describe-shell" => Self::DescribeShell,
            "Code Generator" | "code" => Self::Code,
            _ => return None,
        };
        Some(role)
    }

    /// Returns the name of the role.
    pub fn name(&self) -> &str {
        match self {
            Self::Default => "ShellGPT",
            Self::Shell => "Shell Command Generator",
            Self::DescribeShell => "Shell Command Descriptor",
            Self::Code => "Code Generator",
            Self::Custom { name, .. } => name,
        }
    }

    /// Returns whether the model may call functions under this role.
    #[inline]
    pub fn tools_allowed(&self) -> bool {
        matches!(self, Self::Default | Self::Custom { .. })
    }

    /// Returns the system instructions of the role.
    pub fn instructions(&self) -> String {
        let os = host_os();
        let shell = host_shell();
        match self {
            Self::Default => format!(
                "You are ShellGPT\n\
                 You are programming and system administration assistant.\n\
                 You are managing {os} operating system with {shell} shell.\n\
                 Provide short responses in about 100 words, unless you are \
                 specifically asked for more details.\n\
                 If you need to store any data, assume it will be stored in \
                 the conversation.\n\
                 APPLY MARKDOWN formatting when possible."
            ),
            Self::Shell => format!(
                "Provide only {shell} commands for {os} without any \
                 description.\n\
                 If there is a lack of details, provide most logical \
                 solution.\n\
                 Ensure the output is a valid shell command.\n\
                 If multiple steps required try to combine them together \
                 using &&.\n\
                 Provide only plain text without Markdown formatting."
            ),
            Self::DescribeShell => "Provide a terse, single sentence \
                 description of the given shell command.\n\
                 Describe each argument and option of the command.\n\
                 Provide short responses in about 80 words.\n\
                 APPLY MARKDOWN formatting when possible."
                .to_owned(),
            Self::Code => "Provide only code as output without any \
                 description.\n\
                 Provide only code in plain text format without Markdown \
                 formatting.\n\
                 If there is a lack of details, provide most logical \
                 solution.\n\
                 You are not allowed to ask for more details."
                .to_owned(),
            Self::Custom { instructions, .. } => instructions.clone(),
        }
    }
}

#[inline]
fn host_os() -> &'static str {
    match env::consts::OS {
        "linux" => "Linux",
        "macos" => "macOS",
        "windows" => "Windows",
        _ => "some other OS",
    }
}

fn host_shell() -> String {
    env::var_os("SHELL")
        .as_deref()
        .map(Path::new)
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sh".to_owned())
}
