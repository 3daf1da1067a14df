use std::io::Write;
use std::path::{Path, PathBuf};
use std::{fs, io};

use anyhow::{bail, Context, Error};
use clap::ArgMatches;
use mold::machinery::{tokenize, Instructions};
use mold::value::{Value, ValueMap};
use mold::{
    CompiledTemplate, Error as MError, HtmlEscapeMode, Mold, Settings, UndefinedBehavior,
};

use crate::output::{Output, STDIN_STDOUT};

mod cli;
mod output;

fn read_source(path: &Path, what: &str) -> Result<String, Error> {
    if path == Path::new(STDIN_STDOUT) {
        io::read_to_string(io::stdin()).with_context(|| format!("unable to read {what} from stdin"))
    } else {
        fs::read_to_string(path)
            .with_context(|| format!("unable to read {what} file '{}'", path.display()))
    }
}

fn load_data(path: &Path) -> Result<Value, Error> {
    let contents = read_source(path, "data")?;
    let data: serde_json::Value =
        serde_json::from_str(&contents).context("failed to parse input data as JSON")?;
    Ok(Value::from(data))
}

fn interpret_raw_value(s: &str) -> Result<Value, Error> {
    serde_json::from_str::<serde_json::Value>(s)
        .map(Value::from)
        .with_context(|| format!("invalid raw value '{}' (not valid JSON)", s))
}

fn parse_defines(matches: &ArgMatches) -> Result<ValueMap, Error> {
    let mut defines = ValueMap::new();
    if let Some(items) = matches.get_many::<String>("define") {
        for item in items {
            if let Some((key, raw_value)) = item.split_once(":=") {
                defines.insert(key.to_string(), interpret_raw_value(raw_value)?);
            } else if let Some((key, string_value)) = item.split_once('=') {
                defines.insert(key.to_string(), Value::from(string_value));
            } else {
                defines.insert(item.to_string(), Value::from(true));
            }
        }
    }
    Ok(defines)
}

fn make_settings(matches: &ArgMatches) -> Settings {
    Settings {
        html_escape: match matches.get_one::<String>("escape").map(|x| x.as_str()) {
            Some("extended") => HtmlEscapeMode::Extended,
            _ => HtmlEscapeMode::Minimal,
        },
        undefined_behavior: if matches.get_flag("strict") {
            UndefinedBehavior::Strict
        } else {
            UndefinedBehavior::Lenient
        },
        debug: true,
        ..Settings::default()
    }
}

fn register_partials(mold: &Mold, matches: &ArgMatches) -> Result<(), Error> {
    if let Some(items) = matches.get_many::<String>("partial") {
        for item in items {
            let Some((name, path)) = item.split_once('=') else {
                bail!("partial '{}' needs to be a name=path pair", item);
            };
            let source = read_source(Path::new(path), "partial")?;
            mold.bake_named(name, &source)
                .with_context(|| format!("failed to compile partial '{}'", name))?;
        }
    }
    Ok(())
}

fn print_instructions(output: &mut Output, instructions: &Instructions) -> Result<(), Error> {
    for idx in 0.. {
        if let Some(instruction) = instructions.get(idx) {
            writeln!(output, "{idx:4}: {instruction:?}")?;
        } else {
            break;
        }
    }
    Ok(())
}

fn execute() -> Result<i32, Error> {
    let matches = cli::make_command().get_matches();

    let template_path = Path::new(matches.get_one::<String>("template").unwrap());
    let data_path = matches.get_one::<PathBuf>("data");
    if template_path == Path::new(STDIN_STDOUT)
        && data_path.map_or(false, |x| x == Path::new(STDIN_STDOUT))
    {
        bail!("cannot read both template and data from stdin");
    }

    let input = match data_path {
        Some(path) => load_data(path)?,
        None => Value::from(()),
    };
    let source = read_source(template_path, "template")?;
    let name = template_path.to_string_lossy().to_string();
    let mut output = Output::new(matches.get_one::<PathBuf>("output").unwrap())?;

    if let Some(dump) = matches.get_one::<String>("dump") {
        match dump.as_str() {
            "tokens" => {
                for token in tokenize(&source, Some(name.as_str()))? {
                    writeln!(&mut output, "{:?}", token)?;
                }
            }
            "instructions" => {
                let compiled = CompiledTemplate::new(Some(name.as_str()), &source)?;
                print_instructions(&mut output, compiled.instructions())?;
            }
            _ => unreachable!(),
        }
    } else {
        let bindings = Value::from(parse_defines(&matches)?);
        let mold = Mold::with_settings(bindings, make_settings(&matches));
        register_partials(&mold, &matches)?;
        log::debug!("rendering {} with {} commands", name, mold.registered_names().len());
        let result = mold.bake_named(&name, &source)?.render(input)?;
        if matches.get_flag("no-newline") {
            write!(&mut output, "{result}")?;
        } else {
            writeln!(&mut output, "{result}")?;
        }
    }

    output.commit()?;
    Ok(0)
}

pub fn print_error(err: &Error) {
    eprintln!("error: {err}");
    if let Some(err) = err.downcast_ref::<MError>() {
        if err.template_source().is_some() {
            eprintln!("{err:#}");
        }
    }
    let mut source_opt = err.source();
    while let Some(source) = source_opt {
        eprintln!();
        eprintln!("caused by: {source}");
        if let Some(source) = source.downcast_ref::<MError>() {
            if source.template_source().is_some() {
                eprintln!("{source:#}");
            }
        }
        source_opt = source.source();
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    match execute() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            print_error(&err);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    fn matches_for(args: &[&str]) -> ArgMatches {
        cli::make_command()
            .try_get_matches_from(std::iter::once("mold").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_defines() {
        let matches = matches_for(&["-D", "name=Peter", "-D", "id:=42", "-D", "flag"]);
        let defines = parse_defines(&matches).unwrap();
        assert_eq!(defines.get("name"), Some(&Value::from("Peter")));
        assert_eq!(defines.get("id"), Some(&Value::from(42)));
        assert_eq!(defines.get("flag"), Some(&Value::from(true)));

        let matches = matches_for(&["-D", "bad:={"]);
        assert!(parse_defines(&matches).is_err());
    }

    #[test]
    fn test_settings() {
        let settings = make_settings(&matches_for(&["--escape", "extended", "--strict"]));
        assert_eq!(settings.html_escape, HtmlEscapeMode::Extended);
        assert_eq!(settings.undefined_behavior, UndefinedBehavior::Strict);

        let settings = make_settings(&matches_for(&[]));
        assert_eq!(settings.html_escape, HtmlEscapeMode::Minimal);
        assert_eq!(settings.undefined_behavior, UndefinedBehavior::Lenient);
    }

    #[test]
    fn test_load_data_and_partials() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data.json");
        fs::write(&data, r#"{"items": [1, 2]}"#).unwrap();
        let partial = dir.path().join("item.mold");
        fs::write(&partial, "(<<t $in>>)").unwrap();

        let partial_arg = format!("item={}", partial.display());
        let matches = matches_for(&["-p", &partial_arg]);
        let mold = Mold::new();
        register_partials(&mold, &matches).unwrap();

        let renderer = mold.bake("<<for x $in.items>><<item x>><</for>>").unwrap();
        let input = load_data(&data).unwrap();
        assert_eq!(renderer.render(input).unwrap(), "(1)(2)");

        let matches = matches_for(&["-p", "no-separator"]);
        assert!(register_partials(&mold, &matches).is_err());
    }
}
