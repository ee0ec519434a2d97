//! CLI: schema files → grammar (json | ebnf), plus describe and check helpers.
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, info};

use crate::cache::GrammarCache;
use crate::grammar::CompiledGrammar;
use crate::lower::{compile_with, CompileOptions};
use crate::matcher::{GrammarMatcher, MatchStatus, ReferenceMatcher};
use crate::path_de;
use crate::schema::Schema;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// compile JSON Schema documents into grammars for constrained generation
#[derive(Parser, Debug)]
pub struct CommandLineInterface {
    /// debug logging (RUST_LOG takes precedence when set)
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// compile each input schema and emit its grammar
    Compile(CompileOut),
    /// print each schema as JSON Schema with a summary of its grammar
    Describe(DescribeOut),
    /// test a piece of text against a schema's grammar
    Check(CheckOut),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// JSON Pointer to select the schema inside each document (e.g. /components/schemas/Pet)
    #[arg(long)]
    json_pointer: Option<String>,

    /// inputs are in the crate's own schema IR form instead of JSON Schema
    #[arg(long, default_value_t = false)]
    ir: bool,

    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,

    /// compile options file (JSON), e.g. {"max_list_unroll": 64}
    #[arg(long)]
    options: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Ebnf,
}

#[derive(clap::Parser, Debug)]
struct CompileOut {
    #[command(flatten)]
    input_settings: InputSettings,

    #[arg(long, value_enum, default_value_t = Format::Json)]
    format: Format,

    /// output directory, one file per input (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct DescribeOut {
    #[command(flatten)]
    input_settings: InputSettings,
}

#[derive(clap::Parser, Debug)]
struct CheckOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// text to check
    #[arg(long, required_unless_present = "text_file", conflicts_with = "text_file")]
    text: Option<String>,

    /// file holding the text to check
    #[arg(long)]
    text_file: Option<PathBuf>,
}

/// One loaded input.
#[derive(Debug, Clone)]
pub struct SchemaSource {
    pub path: PathBuf,
    pub schema: Schema,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl InputSettings {
    fn load(&self) -> anyhow::Result<Vec<SchemaSource>> {
        let source_paths = resolve_file_path_patterns(&self.input).context("failed to resolve input file paths")?;
        debug!(count = source_paths.len(), "loading schema inputs");
        source_paths.par_iter().map(|path| self.load_one(path)).collect()
    }

    fn load_one(&self, path: &Path) -> anyhow::Result<SchemaSource> {
        let shown = path.display();
        let source = std::fs::read_to_string(path).with_context(|| format!("failed to read {shown}"))?;
        let doc = serde_json::from_str::<Value>(&source).with_context(|| format!("failed to parse JSON ({shown})"))?;
        let doc = match self.json_pointer.as_deref() {
            None => doc,
            Some(pointer) => doc
                .pointer(pointer)
                .cloned()
                .ok_or_else(|| anyhow!("JSON pointer {pointer} selects nothing in {shown}"))?,
        };
        let schema = if self.ir {
            path_de::from_value_with_path::<Schema>(doc).with_context(|| format!("invalid schema IR ({shown})"))?
        } else {
            Schema::from_json_schema(&doc).with_context(|| format!("unsupported JSON Schema ({shown})"))?
        };
        Ok(SchemaSource { path: path.to_path_buf(), schema })
    }

    fn compile_options(&self) -> anyhow::Result<CompileOptions> {
        match self.options.as_deref() {
            None => Ok(CompileOptions::default()),
            Some(path) => Ok(path_de::read_with_path::<CompileOptions>(path)?),
        }
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn run(&self) -> anyhow::Result<ExitCode> {
        match &self.cmd {
            Command::Compile(target) => target.run(),
            Command::Describe(target) => target.run(),
            Command::Check(target) => target.run(),
        }
    }
}

impl CompileOut {
    fn run(&self) -> anyhow::Result<ExitCode> {
        let sources = self.input_settings.load()?;
        let cache = GrammarCache::new(self.input_settings.compile_options()?);

        let results: Vec<_> = sources
            .par_iter()
            .map(|source| (source, cache.get_or_compile(&source.schema)))
            .collect();

        let mut failed = 0;
        for (source, result) in results {
            let grammar = match result {
                Ok(grammar) => grammar,
                Err(error) => {
                    eprintln!("{} {}: {error}", "error".red().bold(), source.path.display());
                    failed += 1;
                    continue;
                }
            };
            let rendered = self.render(&grammar)?;
            match self.out.as_ref() {
                Some(dir) => {
                    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
                    let out = dir.join(output_file_name(&source.path, self.format));
                    std::fs::write(&out, &rendered).with_context(|| format!("failed to write {}", out.display()))?;
                    eprintln!("{} {} → {}", "compiled".green(), source.path.display(), out.display());
                }
                None => {
                    if sources.len() > 1 {
                        eprintln!("{}", source.path.display().to_string().bold());
                    }
                    println!("{rendered}");
                }
            }
        }

        let stats = cache.stats();
        info!(inputs = sources.len(), failed, distinct = stats.entries, hits = stats.hits, "compile finished");
        Ok(if failed == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
    }

    fn render(&self, grammar: &Arc<CompiledGrammar>) -> anyhow::Result<String> {
        match self.format {
            Format::Json => Ok(serde_json::to_string_pretty(grammar.as_ref())?),
            Format::Ebnf => Ok(grammar.to_string()),
        }
    }
}

impl DescribeOut {
    fn run(&self) -> anyhow::Result<ExitCode> {
        let options = self.input_settings.compile_options()?;
        let mut failed = false;
        for source in self.input_settings.load()? {
            println!("{}", source.path.display().to_string().bold());
            println!("{}", serde_json::to_string_pretty(&source.schema.to_json_schema())?);
            println!("  root: {}, definitions: {}", source.schema.root.kind(), source.schema.defs.len());
            match compile_with(&source.schema, &options) {
                Ok(grammar) => {
                    println!("  rules: {}, nodes: {}", grammar.rules().len(), grammar.size());
                    for rule in grammar.rules() {
                        println!("    {} {}", rule.id.to_string().cyan(), rule.name);
                    }
                }
                Err(error) => {
                    println!("  {} {error}", "error".red().bold());
                    failed = true;
                }
            }
        }
        Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
    }
}

impl CheckOut {
    fn run(&self) -> anyhow::Result<ExitCode> {
        let mut sources = self.input_settings.load()?;
        if sources.len() != 1 {
            bail!("check takes exactly one schema, got {}", sources.len());
        }
        let source = sources.remove(0);
        let text = match (&self.text, &self.text_file) {
            (Some(text), _) => text.clone(),
            (None, Some(file)) => {
                std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?
            }
            (None, None) => bail!("one of --text or --text-file is required"),
        };
        let text = text.strip_suffix('\n').unwrap_or(&text);

        let grammar = compile_with(&source.schema, &self.input_settings.compile_options()?)?;
        let matcher = ReferenceMatcher::new(&grammar)?;
        match matcher.match_prefix(text) {
            MatchStatus::Complete => {
                println!("{}", "accepted".green().bold());
                Ok(ExitCode::SUCCESS)
            }
            MatchStatus::Partial => {
                println!("{} (valid prefix, {} chars)", "incomplete".yellow().bold(), text.chars().count());
                Ok(ExitCode::FAILURE)
            }
            MatchStatus::Reject => {
                let mut session = matcher.session();
                let offset = text.chars().take_while(|&c| session.advance(c)).count();
                println!("{} at char {offset}", "rejected".red().bold());
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn output_file_name(input: &Path, format: Format) -> String {
    let stem = input.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_else(|| "schema".to_string());
    match format {
        Format::Json => format!("{stem}.grammar.json"),
        Format::Ebnf => format!("{stem}.ebnf"),
    }
}

fn resolve_file_path_patterns<I>(patterns: I) -> anyhow::Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'['))
    }

    let mut out = Vec::<PathBuf>::new();
    for raw in patterns {
        let pattern = raw.as_ref();
        if !has_glob_chars(pattern) {
            out.push(PathBuf::from(pattern));
            continue;
        }
        let before = out.len();
        for entry in glob::glob(pattern)? {
            out.push(entry?);
        }
        if out.len() == before {
            bail!("glob pattern matched no files: {pattern}");
        }
    }
    out.dedup();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compile_invocation() {
        let cli = CommandLineInterface::try_parse_from([
            "schema-grammar", "-v", "compile", "-i", "a.json", "b/*.json", "--format", "ebnf", "--out", "dist",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Command::Compile(target) = cli.cmd else { panic!("expected compile") };
        assert_eq!(target.format, Format::Ebnf);
        assert_eq!(target.input_settings.input, ["a.json", "b/*.json"]);
        assert_eq!(target.out, Some(PathBuf::from("dist")));
    }

    #[test]
    fn check_requires_text() {
        assert!(CommandLineInterface::try_parse_from(["schema-grammar", "check", "-i", "a.json"]).is_err());
        assert!(CommandLineInterface::try_parse_from(["schema-grammar", "check", "-i", "a.json", "--text", "{}"]).is_ok());
    }

    #[test]
    fn output_names_follow_format() {
        assert_eq!(output_file_name(Path::new("schemas/pet.json"), Format::Json), "pet.grammar.json");
        assert_eq!(output_file_name(Path::new("pet.json"), Format::Ebnf), "pet.ebnf");
    }

    #[test]
    fn literal_paths_pass_through_and_empty_globs_fail() {
        let paths = resolve_file_path_patterns(["x.json", "x.json"]).unwrap();
        assert_eq!(paths, [PathBuf::from("x.json")]);
        assert!(resolve_file_path_patterns(["/definitely/not/here/*.json"]).is_err());
    }
}
