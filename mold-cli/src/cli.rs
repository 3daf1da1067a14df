use std::path::PathBuf;

use clap::{arg, command, value_parser, ArgAction, Command};

const BEHAVIOR: &str = "Template Behavior";
const ADVANCED: &str = "Advanced";

pub(super) fn make_command() -> Command {
    command!()
        .max_term_width(120)
        .args([
            arg!(-D --define <EXPR> "Defines a binding (key=value / key:=json_value)")
                .long_help("\
                    Defines a binding that is visible in every template.  It supports three \
                    forms: key defines a single bool, key=value defines a string value and \
                    key:=json_value defines a JSON value.  It can be supplied multiple times.\n\n\
                    \
                    Examples:\n\
                    -D name=Peter       defines a basic string\n\
                    -D user_id:=42      defines an integer\n\
                    -D is_active        defines a boolean")
                .action(ArgAction::Append)
                .help_heading(BEHAVIOR),
            arg!(-p --partial <NAME_PATH> "Registers a named template (name=path)")
                .long_help("\
                    Compiles the template at path and registers it under name so that the \
                    main template can render it with <<name arg>>.  It can be supplied \
                    multiple times.")
                .action(ArgAction::Append)
                .help_heading(BEHAVIOR),
            arg!(--escape <MODE> "Sets the characters escaped by the text directive")
                .value_parser(["minimal", "extended"])
                .default_value("minimal")
                .help_heading(BEHAVIOR),
            arg!(--strict "Fail on undefined values in output, conditions and loops")
                .help_heading(BEHAVIOR),
            arg!(--"no-newline" "Do not output a trailing newline"),
            arg!(--dump <KIND> "Dump internals of a template instead of rendering it")
                .value_parser(["tokens", "instructions"])
                .help_heading(ADVANCED),
            arg!(-o --output <FILENAME> "Path to the output file")
                .default_value("-")
                .value_parser(value_parser!(PathBuf)),
            arg!(template: [TEMPLATE] "Path to the input template").default_value("-"),
            arg!(data: [DATA] "Path to the JSON data file").value_parser(value_parser!(PathBuf)),
        ])
        .about("mold renders <<directive>> templates with JSON input data.")
        .after_help("The data is available to the template as $in.  Set RUST_LOG=debug to see what the engine does.")
}
