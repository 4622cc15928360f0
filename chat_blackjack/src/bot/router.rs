//! Maps raw commands and callback payloads to routes.
//!
//! Commands look like `/<name>[@bot][/arg...]`, callbacks like `<action>/<arg>`.

use std::fmt;

use super::errors::DispatchError;
use super::update::UpdateKind;

/// Chat commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Start,
    Stop,
    Continue,
    Balances,
    LastRound,
    Rules,
}

impl Command {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "start" => Some(Command::Start),
            "stop" => Some(Command::Stop),
            "continue" => Some(Command::Continue),
            "balances" => Some(Command::Balances),
            "last_round" => Some(Command::LastRound),
            "rules" => Some(Command::Rules),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Stop => "stop",
            Command::Continue => "continue",
            Command::Balances => "balances",
            Command::LastRound => "last_round",
            Command::Rules => "rules",
        }
    }
}

/// Keyboard callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Query {
    PlayersNum(i32),
    Bet(i64),
    GetCard,
    Enough,
}

impl Query {
    pub fn as_str(&self) -> &'static str {
        match self {
            Query::PlayersNum(_) => "players_num",
            Query::Bet(_) => "bet",
            Query::GetCard => "get_card",
            Query::Enough => "enough",
        }
    }
}

/// A resolved handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Command(Command),
    Query(Query),
}

impl Route {
    /// Resolve an update payload
    pub fn parse(kind: &UpdateKind) -> Result<Self, DispatchError> {
        match kind {
            UpdateKind::Message(text) => parse_command(text),
            UpdateKind::Callback(data) => parse_query(data),
        }
    }

    /// Label used in logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            Route::Command(command) => command.as_str(),
            Route::Query(query) => query.as_str(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn parse_command(text: &str) -> Result<Route, DispatchError> {
    let not_found = || DispatchError::RouteNotFound(text.to_string());

    let head = text.split_whitespace().next().ok_or_else(not_found)?;
    let body = head.strip_prefix('/').ok_or_else(not_found)?;
    let name = body.split('/').next().unwrap_or_default();
    let name = name.split('@').next().unwrap_or_default();

    Command::from_name(name)
        .map(Route::Command)
        .ok_or_else(not_found)
}

fn parse_query(data: &str) -> Result<Route, DispatchError> {
    let not_found = || DispatchError::RouteNotFound(data.to_string());

    let mut parts = data.trim().split('/');
    let action = parts.next().unwrap_or_default();
    let arg = parts.next();

    let query = match (action, arg) {
        ("players_num", Some(n)) => Query::PlayersNum(n.parse().map_err(|_| not_found())?),
        ("bet", Some(amount)) => Query::Bet(amount.parse().map_err(|_| not_found())?),
        ("get_card", _) => Query::GetCard,
        ("enough", _) => Query::Enough,
        _ => return Err(not_found()),
    };

    Ok(Route::Query(query))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(text: &str) -> Result<Route, DispatchError> {
        Route::parse(&UpdateKind::Message(text.to_string()))
    }

    fn callback(data: &str) -> Result<Route, DispatchError> {
        Route::parse(&UpdateKind::Callback(data.to_string()))
    }

    #[test]
    fn test_commands_resolve() {
        assert_eq!(message("/start").unwrap(), Route::Command(Command::Start));
        assert_eq!(
            message("/start@blackjack_bot").unwrap(),
            Route::Command(Command::Start)
        );
        assert_eq!(
            message("/last_round please").unwrap(),
            Route::Command(Command::LastRound)
        );
        assert_eq!(
            message("/continue/now").unwrap(),
            Route::Command(Command::Continue)
        );
    }

    #[test]
    fn test_plain_text_is_not_a_route() {
        assert!(matches!(
            message("hello there"),
            Err(DispatchError::RouteNotFound(_))
        ));
        assert!(matches!(message(""), Err(DispatchError::RouteNotFound(_))));
        assert!(matches!(
            message("/deal"),
            Err(DispatchError::RouteNotFound(_))
        ));
    }

    #[test]
    fn test_callbacks_resolve() {
        assert_eq!(
            callback("players_num/3").unwrap(),
            Route::Query(Query::PlayersNum(3))
        );
        assert_eq!(callback("bet/500").unwrap(), Route::Query(Query::Bet(500)));
        assert_eq!(callback("get_card").unwrap(), Route::Query(Query::GetCard));
        assert_eq!(callback("enough/").unwrap(), Route::Query(Query::Enough));
    }

    #[test]
    fn test_malformed_callbacks_rejected() {
        for data in ["bet", "bet/lots", "players_num/", "split/2", "start"] {
            assert!(
                matches!(callback(data), Err(DispatchError::RouteNotFound(_))),
                "{data} should not resolve"
            );
        }
    }
}
