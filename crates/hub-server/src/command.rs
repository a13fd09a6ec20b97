//! Operator command grammar: `<agentId> <ip> <action...>`.

use cmdrelay_protocol::Command;

/// Operator line that does not follow the command grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error(
        "incorrect command format, must follow: <agent ID> <ip address> <...command> \
         (got {0} token(s))"
    )]
    TooFewTokens(usize),
}

/// Parses one operator line.
///
/// Tokens are separated by any run of whitespace; everything after the
/// second token is the action, rejoined with single spaces.
pub fn parse_line(line: &str) -> Result<Command, ParseError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let [agent_id, ip, action @ ..] = tokens.as_slice() else {
        return Err(ParseError::TooFewTokens(tokens.len()));
    };
    if action.is_empty() {
        return Err(ParseError::TooFewTokens(tokens.len()));
    }

    Ok(Command {
        agent_id: (*agent_id).to_owned(),
        ip: (*ip).to_owned(),
        action: action.join(" "),
    })
}
