//! Language dispatch table.
//!
//! Each supported language maps to a [`CommandSpec`]: an optional compile
//! command, a run command, and how the source reaches the toolchain.
//! Adding a language means adding a table entry, never a new branch.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SandboxError;

/// Artifact file name used when a language entry does not set one.
#[cfg(windows)]
const DEFAULT_ARTIFACT: &str = "main.exe";
#[cfg(not(windows))]
const DEFAULT_ARTIFACT: &str = "main";

fn default_artifact() -> String {
    DEFAULT_ARTIFACT.into()
}

/// A program plus argument templates.
///
/// Arguments may contain `{workspace}`, `{artifact}`, `{source}` and
/// `{code}` placeholders. Unknown `{...}` sequences are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// How source text reaches the compiler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceDelivery {
    /// Written to the compiler's standard input, which is then closed.
    #[default]
    Stdin,
    /// Written to a named file inside the workspace before compiling.
    File { name: String },
}

/// Per-language command templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Absent for interpreted languages.
    #[serde(default)]
    pub compile: Option<CommandTemplate>,

    pub run: CommandTemplate,

    #[serde(default)]
    pub source: SourceDelivery,

    /// File name of the compiled artifact inside the workspace.
    #[serde(default = "default_artifact")]
    pub artifact: String,
}

/// Values substituted into command templates for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub workspace: &'a Path,
    pub artifact: &'a Path,
    pub source: Option<&'a Path>,
    pub code: &'a str,
}

impl TemplateContext<'_> {
    fn lookup(&self, name: &str) -> Result<Option<Cow<'_, str>>, SandboxError> {
        let value = match name {
            "workspace" => self.workspace.to_string_lossy(),
            "artifact" => self.artifact.to_string_lossy(),
            "code" => Cow::Borrowed(self.code),
            "source" => self
                .source
                .ok_or_else(|| {
                    SandboxError::Template(
                        "{source} used but the language does not write a source file".into(),
                    )
                })?
                .to_string_lossy(),
            _ => return Ok(None),
        };
        Ok(Some(value))
    }
}

impl CommandTemplate {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
        }
    }

    /// Substitute placeholders, returning the program and its arguments.
    pub fn expand(&self, ctx: &TemplateContext<'_>) -> Result<(String, Vec<String>), SandboxError> {
        let program = expand_arg(&self.program, ctx)?;
        let args = self
            .args
            .iter()
            .map(|a| expand_arg(a, ctx))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((program, args))
    }
}

/// Single left-to-right pass, so substituted text (e.g. source code
/// containing `{workspace}`) is never expanded again.
fn expand_arg(arg: &str, ctx: &TemplateContext<'_>) -> Result<String, SandboxError> {
    let mut out = String::with_capacity(arg.len());
    let mut rest = arg;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let Some(close) = tail.find('}') else {
            out.push_str(tail);
            return Ok(out);
        };
        match ctx.lookup(&tail[1..close])? {
            Some(value) => out.push_str(&value),
            None => out.push_str(&tail[..=close]),
        }
        rest = &tail[close + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

impl CommandSpec {
    pub const fn needs_compile(&self) -> bool {
        self.compile.is_some()
    }
}

/// Registered languages, keyed by lowercase identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageTable(HashMap<String, CommandSpec>);

fn normalize(id: &str) -> String {
    id.trim().to_lowercase()
}

impl LanguageTable {
    /// The reference set: `c`, `c++` (alias `cpp`), `java`, `python`.
    pub fn builtin() -> Self {
        let native = |compiler: &str, lang: &str| CommandSpec {
            compile: Some(CommandTemplate::new(
                compiler,
                &["-x", lang, "-", "-o", "{artifact}"],
            )),
            run: CommandTemplate::new("{artifact}", &[]),
            source: SourceDelivery::Stdin,
            artifact: default_artifact(),
        };

        let mut table = Self::default();
        table.insert("c", native("gcc", "c"));
        table.insert("c++", native("g++", "c++"));
        table.insert("cpp", native("g++", "c++"));
        table.insert(
            "java",
            CommandSpec {
                compile: Some(CommandTemplate::new(
                    "javac",
                    &["-d", "{workspace}", "{source}"],
                )),
                run: CommandTemplate::new("java", &["-cp", "{workspace}", "Main"]),
                source: SourceDelivery::File {
                    name: "Main.java".into(),
                },
                artifact: "Main.class".into(),
            },
        );
        table.insert(
            "python",
            CommandSpec {
                compile: None,
                run: CommandTemplate::new("python3", &["-c", "{code}"]),
                source: SourceDelivery::Stdin,
                artifact: default_artifact(),
            },
        );
        table
    }

    /// Look up a language identifier (case-insensitive, surrounding
    /// whitespace ignored). `None` means the language is unsupported.
    pub fn resolve(&self, language: &str) -> Option<&CommandSpec> {
        self.0.get(&normalize(language))
    }

    pub fn insert(&mut self, language: &str, spec: CommandSpec) -> Option<CommandSpec> {
        self.0.insert(normalize(language), spec)
    }

    /// Merge entries over this table; incoming entries win on collision.
    pub fn merge(&mut self, other: Self) {
        for (name, spec) in other.0 {
            if self.insert(&name, spec).is_some() {
                info!(language = %name, "Custom language entry overrides built-in");
            }
        }
    }

    /// Sorted identifiers, for listing.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.0.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Sorted view of the whole table.
    pub fn entries(&self) -> BTreeMap<&str, &CommandSpec> {
        self.0.iter().map(|(k, v)| (k.as_str(), v)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
