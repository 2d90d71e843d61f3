use crate::envelope::{FileReply, ResponseEnvelope};
use crate::errors::ChannelError;
use crate::managers::channel::CommandResult;
use serde_json::Value;

/// Turns the outcome of one channel invocation into the reply body.
///
/// * channel failure: error envelope carrying the channel diagnostic
/// * non-zero exit: error envelope with the exit code and remote stderr
/// * zero exit: the trimmed stdout parsed as JSON and relayed untouched, or
///   an error envelope quoting the output when it does not parse
pub fn interpret(filename: &str, outcome: Result<CommandResult, ChannelError>) -> FileReply {
    let result = match outcome {
        Ok(result) => result,
        Err(err) => return FileReply::Failed(ResponseEnvelope::retrieval_error(filename, err)),
    };

    if result.exit_code != 0 {
        return FileReply::Failed(ResponseEnvelope::retrieval_error(
            filename,
            format!(
                "Legacy system processing failed - Exit code: {}, Error: {}",
                result.exit_code, result.stderr
            ),
        ));
    }

    let output = result.stdout.trim();
    match serde_json::from_str::<Value>(output) {
        Ok(doc) => FileReply::Relayed(doc),
        Err(_) => FileReply::Failed(ResponseEnvelope::retrieval_error(
            filename,
            format!("Invalid response format: {}", output),
        )),
    }
}
