//! Built-in commands.

use std::time::Duration;

use super::context::Context;
use super::jobs::{JobId, JobInfo};
use super::registry::{Command, Entry, Lookup, Namespace, Registry};
use super::vars::Scope;
use crate::error::{ShellError, ShellResult};

/// Registry holding every built-in command.
pub fn registry() -> Registry {
    let mut registry = Registry::new();
    register(&mut registry);
    registry
}

/// Add the built-in commands to `registry`.
pub fn register(registry: &mut Registry) {
    registry.register(
        Command::new("print", print)
            .alias("echo")
            .describe("Print arguments, or pass piped input through")
            .usage("print [text...]"),
    );
    registry.register(
        Command::new("grep", grep)
            .describe("Keep piped lines containing a pattern")
            .usage("grep [-v] [-i] <pattern>")
            .args(1, Some(3)),
    );
    registry.register(
        Command::new("set", set)
            .describe("Show or assign shared variables")
            .usage("set [name [value...]]"),
    );
    registry.register(
        Command::new("unset", unset)
            .describe("Remove a shared variable")
            .usage("unset <name>")
            .args(1, Some(1)),
    );
    registry.register(
        Command::new("alias", alias)
            .describe("Show or define aliases")
            .usage("alias [name [replacement...]]"),
    );
    registry.register(
        Command::new("unalias", unalias)
            .describe("Remove an alias")
            .usage("unalias <name>")
            .args(1, Some(1)),
    );
    registry.register(
        Command::new("help", help)
            .alias("?")
            .describe("List commands or describe one")
            .usage("help [command...]"),
    );
    registry.register(
        Command::new("run", run_script)
            .alias("source")
            .describe("Run each line of a script with positional arguments")
            .usage("run <file> [args...]")
            .args(1, None),
    );
    registry.register(
        Command::new("sleep", sleep)
            .describe("Wait for a number of milliseconds")
            .usage("sleep <ms>")
            .args(1, Some(1)),
    );
    registry.register(
        Command::new("env", env)
            .describe("Show the session environment")
            .usage("env")
            .args(0, Some(0)),
    );
    registry.register(
        Command::new("jobs", list_jobs)
            .describe("List background jobs")
            .usage("jobs")
            .args(0, Some(0)),
    );
    registry.register(
        Command::new("kill", kill_job)
            .describe("Cancel a background job")
            .usage("kill <id>")
            .args(1, Some(1)),
    );
    registry.register(
        Namespace::new("job")
            .describe("Manage background jobs")
            .with(
                Command::new("list", list_jobs)
                    .alias("ls")
                    .describe("List background jobs")
                    .usage("job list")
                    .args(0, Some(0)),
            )
            .with(
                Command::new("kill", kill_job)
                    .describe("Cancel a background job")
                    .usage("job kill <id>")
                    .args(1, Some(1)),
            )
            .with(
                Command::new("clean", clean_jobs)
                    .describe("Forget finished jobs")
                    .usage("job clean")
                    .args(0, Some(0)),
            ),
    );
}

fn print(ctx: &mut Context<'_>, args: &[String]) -> ShellResult<String> {
    if args.is_empty() {
        return Ok(ctx.take_stdin().unwrap_or_default());
    }
    Ok(args.join(" "))
}

fn grep(ctx: &mut Context<'_>, args: &[String]) -> ShellResult<String> {
    let mut invert = false;
    let mut ignore_case = false;
    let mut pattern = None;
    for arg in args {
        match arg.as_str() {
            "-v" => invert = true,
            "-i" => ignore_case = true,
            _ if pattern.is_none() => pattern = Some(arg.as_str()),
            _ => return Err(ShellError::usage("grep [-v] [-i] <pattern>")),
        }
    }
    let Some(pattern) = pattern else {
        return Err(ShellError::usage("grep [-v] [-i] <pattern>"));
    };

    let pattern = if ignore_case {
        pattern.to_lowercase()
    } else {
        pattern.to_string()
    };
    let input = ctx.take_stdin().unwrap_or_default();
    let kept: Vec<&str> = input
        .lines()
        .filter(|line| {
            let found = if ignore_case {
                line.to_lowercase().contains(&pattern)
            } else {
                line.contains(&pattern)
            };
            found != invert
        })
        .collect();
    Ok(kept.join("\n"))
}

fn set(ctx: &mut Context<'_>, args: &[String]) -> ShellResult<String> {
    let vars = ctx.vars();
    match args {
        [] => Ok(vars
            .variables()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("\n")),
        [name] => vars
            .get(name)
            .ok_or_else(|| ShellError::failed(format!("not set: {}", vars.key(name)))),
        [name, value @ ..] => {
            if name.is_empty() || name.as_str() == vars.key("") {
                return Err(ShellError::usage("set [name [value...]]"));
            }
            vars.set(name, &value.join(" "));
            Ok(String::new())
        }
    }
}

fn unset(ctx: &mut Context<'_>, args: &[String]) -> ShellResult<String> {
    let vars = ctx.vars();
    if vars.unset(&args[0]) {
        Ok(String::new())
    } else {
        Err(ShellError::failed(format!("not set: {}", vars.key(&args[0]))))
    }
}

fn alias(ctx: &mut Context<'_>, args: &[String]) -> ShellResult<String> {
    let vars = ctx.vars();
    match args {
        [] => Ok(vars
            .aliases()
            .into_iter()
            .map(|(name, replacement)| format!("{name}={replacement}"))
            .collect::<Vec<_>>()
            .join("\n")),
        [name] => vars
            .alias(name)
            .ok_or_else(|| ShellError::failed(format!("no such alias: {name}"))),
        [name, replacement @ ..] => {
            vars.set_alias(name, &replacement.join(" "));
            Ok(String::new())
        }
    }
}

fn unalias(ctx: &mut Context<'_>, args: &[String]) -> ShellResult<String> {
    if ctx.vars().unset_alias(&args[0]) {
        Ok(String::new())
    } else {
        Err(ShellError::failed(format!("no such alias: {}", args[0])))
    }
}

fn help(ctx: &mut Context<'_>, args: &[String]) -> ShellResult<String> {
    let registry = ctx.registry();
    if args.is_empty() {
        return Ok(overview(registry.entries()));
    }
    match registry.lookup(args) {
        Lookup::Leaf { command, .. } => {
            let mut text = format!("usage: {}", command.usage_text());
            if !command.description().is_empty() {
                text.push_str(&format!("\n{}", command.description()));
            }
            if !command.aliases().is_empty() {
                text.push_str(&format!("\naliases: {}", command.aliases().join(", ")));
            }
            Ok(text)
        }
        Lookup::Namespace(ns) => Ok(format!("usage: {}\n{}", ns.usage(), overview(ns.entries()))),
        Lookup::NotFound { name, .. } => Err(ShellError::failed(format!("no help for: {name}"))),
    }
}

fn overview<'a>(entries: impl Iterator<Item = &'a Entry>) -> String {
    let entries: Vec<&Entry> = entries.collect();
    let width = entries.iter().map(|e| e.name().len()).max().unwrap_or(0);
    entries
        .iter()
        .map(|e| format!("  {:<width$}  {}", e.name(), e.description()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Blank lines and `#` comments are skipped. `$1..$n`, `$#` and `$*`
/// resolve only inside the script.
fn run_script(ctx: &mut Context<'_>, args: &[String]) -> ShellResult<String> {
    let (path, script_args) = args
        .split_first()
        .ok_or_else(|| ShellError::usage("run <file> [args...]"))?;
    let script = std::fs::read_to_string(path)?;
    let scope = Scope::positional(ctx.vars().marker(), script_args);

    let mut outputs = Vec::new();
    for line in script.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        ctx.check_cancelled()?;
        let output = ctx.execute_in(line, scope.clone())?;
        if !output.is_empty() {
            outputs.push(output);
        }
    }
    Ok(outputs.join("\n"))
}

fn sleep(ctx: &mut Context<'_>, args: &[String]) -> ShellResult<String> {
    let ms: u64 = args[0]
        .parse()
        .map_err(|_| ShellError::usage("sleep <ms>"))?;
    ctx.sleep(Duration::from_millis(ms))?;
    Ok(String::new())
}

fn env(ctx: &mut Context<'_>, _args: &[String]) -> ShellResult<String> {
    let mut pairs: Vec<String> = ctx
        .env()
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    pairs.sort_unstable();

    let mut scoped: Vec<String> = ctx
        .invocation()
        .scope()
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    scoped.sort_unstable();

    pairs.extend(scoped);
    Ok(pairs.join("\n"))
}

fn format_job(job: &JobInfo) -> String {
    format!(
        "[{}] {:<9} {:>6}ms  {}",
        job.id,
        job.status.to_string(),
        job.elapsed.as_millis(),
        job.description
    )
}

fn list_jobs(ctx: &mut Context<'_>, _args: &[String]) -> ShellResult<String> {
    Ok(ctx
        .jobs()
        .list()
        .iter()
        .map(format_job)
        .collect::<Vec<_>>()
        .join("\n"))
}

fn kill_job(ctx: &mut Context<'_>, args: &[String]) -> ShellResult<String> {
    let id: JobId = args[0]
        .trim_start_matches('%')
        .parse()
        .map_err(|_| ShellError::usage("kill <id>"))?;
    if ctx.jobs().kill(id) {
        Ok(String::new())
    } else {
        Err(ShellError::failed(format!("no running job: {id}")))
    }
}

fn clean_jobs(ctx: &mut Context<'_>, _args: &[String]) -> ShellResult<String> {
    let removed = ctx.jobs().clean();
    Ok(format!("removed {removed} finished job(s)"))
}
