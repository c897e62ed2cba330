use crate::config::{Config, Location, MatchType};

/// Selects the location entry for a request path, with Nginx precedence:
/// exact matches win outright; otherwise the longest prefix is
/// remembered, and if it is a preferential prefix the regex scan is
/// skipped; otherwise the first matching regex (in configuration order)
/// wins, falling back to the prefix winner.
pub fn match_location<'a>(config: &'a Config, path: &str) -> Option<&'a Location> {
    for location in config.locations() {
        if location.match_type() == MatchType::Exact && location.path() == path {
            return Some(location);
        }
    }

    let mut prefix_winner: Option<&Location> = None;
    for location in config.locations() {
        if !matches!(
            location.match_type(),
            MatchType::Prefix | MatchType::PreferentialPrefix
        ) {
            continue;
        }
        if !path.starts_with(location.path()) {
            continue;
        }
        let longer = prefix_winner
            .map(|winner| location.path().len() > winner.path().len())
            .unwrap_or(true);
        if longer {
            prefix_winner = Some(location);
        }
    }

    if let Some(winner) = prefix_winner {
        if winner.match_type() == MatchType::PreferentialPrefix {
            return Some(winner);
        }
    }

    for location in config.locations() {
        if let Some(regex) = location.regex() {
            if regex.is_match(path) {
                return Some(location);
            }
        }
    }

    prefix_winner
}
