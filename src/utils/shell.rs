/// Quotes `value` as exactly one POSIX shell word.
///
/// Everything is wrapped in single quotes; embedded single quotes close the
/// quoted run, emit an escaped quote and reopen it (`'` becomes `'\''`).
pub fn quote_shell_arg(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Builds the remote invocation `<script> <argument>` with the argument
/// passed as a single opaque word.
pub fn build_remote_command(script: &str, argument: &str) -> String {
    format!("{} {}", script.trim(), quote_shell_arg(argument))
}

#[cfg(test)]
mod tests {
    use super::{build_remote_command, quote_shell_arg};

    #[test]
    fn plain_filename_is_single_quoted() {
        assert_eq!(
            build_remote_command("/home/legacy/proxy_request.sh", "report.txt"),
            "/home/legacy/proxy_request.sh 'report.txt'"
        );
    }

    #[test]
    fn single_quote_cannot_break_out() {
        assert_eq!(
            build_remote_command("/home/legacy/proxy_request.sh", "a'b"),
            "/home/legacy/proxy_request.sh 'a'\\''b'"
        );
        assert_eq!(quote_shell_arg("'; rm -rf / #"), "''\\''; rm -rf / #'");
    }

    #[test]
    fn double_quotes_and_expansions_stay_literal() {
        assert_eq!(quote_shell_arg("\"$HOME\" `id`"), "'\"$HOME\" `id`'");
    }

    #[cfg(unix)]
    #[test]
    fn shell_sees_exactly_one_argument() {
        let inputs = [
            "report.txt",
            "a'b",
            "'; echo pwned; '",
            "$(id) `id` ${HOME}",
            "two words",
            "tab\tand\nnewline",
            "",
        ];
        for input in inputs {
            let output = std::process::Command::new("sh")
                .arg("-c")
                .arg(format!(
                    "set -- {}; printf '%s|%s' \"$1\" \"$#\"",
                    quote_shell_arg(input)
                ))
                .output()
                .expect("run sh");
            let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
            assert_eq!(stdout, format!("{}|1", input), "input {:?}", input);
        }
    }
}
