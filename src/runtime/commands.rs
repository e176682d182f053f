use crate::config::{RepeatMode, ShuffleMode};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    Pause,
    Toggle,
    Next,
    Prev,
    /// `None` toggles.
    Shuffle(Option<ShuffleMode>),
    /// `None` cycles once → repeating → looping.
    Repeat(Option<RepeatMode>),
    /// Track key, album title or artist name.
    Add(String),
    /// Episode URL to download and enqueue.
    Fetch(String),
    /// Remote artwork to cache, or the playing item's cover when `None`.
    Cover(Option<String>),
    Clear,
    Remove(usize),
    Select(usize),
    Seek(f64),
    Rewind,
    Skip,
    Volume(f32),
    List,
    Status,
    Rescan,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  play | pause | toggle | next | prev
  shuffle [normal|shuffled]    repeat [once|repeating|looping]
  add <track|album|artist>     remove <n>    select <n>    clear
  fetch <url>    cover [url]
  seek <seconds>    rewind    skip    volume <0..1>
  list    status    rescan    help    quit";

fn parse_position(arg: &str) -> Result<usize, String> {
    match arg.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(format!("expected a queue position (1-based), got `{arg}`")),
    }
}

fn parse_number<T: std::str::FromStr>(arg: &str) -> Result<T, String> {
    arg.parse().map_err(|_| format!("expected a number, got `{arg}`"))
}

fn parse_mode<T: serde::de::DeserializeOwned>(arg: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(arg.to_ascii_lowercase()))
        .map_err(|_| format!("unknown mode `{arg}`"))
}

/// Parse one input line. Positions are 1-based on the command line.
pub fn parse(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };

    let cmd = match (word.to_ascii_lowercase().as_str(), rest) {
        ("play", "") => Command::Play,
        ("pause", "") => Command::Pause,
        ("toggle", "") => Command::Toggle,
        ("next" | "n", "") => Command::Next,
        ("prev" | "previous" | "p", "") => Command::Prev,
        ("shuffle", "") => Command::Shuffle(None),
        ("shuffle", mode) => Command::Shuffle(Some(parse_mode(mode)?)),
        ("repeat", "") => Command::Repeat(None),
        ("repeat", mode) => Command::Repeat(Some(parse_mode(mode)?)),
        ("add", "") => return Err("add needs a track, album or artist".into()),
        ("add", what) => Command::Add(what.to_string()),
        ("fetch", "") => return Err("fetch needs a URL".into()),
        ("fetch", url) => Command::Fetch(url.to_string()),
        ("cover", "") => Command::Cover(None),
        ("cover", url) => Command::Cover(Some(url.to_string())),
        ("clear", "") => Command::Clear,
        ("remove" | "rm", n) => Command::Remove(parse_position(n)?),
        ("select" | "go", n) => Command::Select(parse_position(n)?),
        ("seek", s) => Command::Seek(parse_number(s)?),
        ("rewind", "") => Command::Rewind,
        ("skip", "") => Command::Skip,
        ("volume" | "vol", v) => Command::Volume(parse_number(v)?),
        ("list" | "ls", "") => Command::List,
        ("status", "") => Command::Status,
        ("rescan", "") => Command::Rescan,
        ("help" | "?", "") => Command::Help,
        ("quit" | "q" | "exit", "") => Command::Quit,
        ("", _) => return Err(String::new()),
        _ => return Err(format!("unknown command `{line}` (try `help`)")),
    };
    Ok(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_words() {
        assert_eq!(parse("play"), Ok(Command::Play));
        assert_eq!(parse("  NEXT "), Ok(Command::Next));
        assert_eq!(parse("q"), Ok(Command::Quit));
        assert_eq!(parse("shuffle"), Ok(Command::Shuffle(None)));
    }

    #[test]
    fn arguments() {
        assert_eq!(parse("add /music/a song.mp3"), Ok(Command::Add("/music/a song.mp3".into())));
        assert_eq!(parse("select 3"), Ok(Command::Select(2)));
        assert_eq!(parse("seek 12.5"), Ok(Command::Seek(12.5)));
        assert_eq!(parse("volume 0.4"), Ok(Command::Volume(0.4)));
        assert_eq!(parse("repeat loop-one"), Ok(Command::Repeat(Some(RepeatMode::Repeating))));
        assert_eq!(parse("shuffle Shuffled"), Ok(Command::Shuffle(Some(ShuffleMode::Shuffled))));
        assert_eq!(parse("fetch https://x/ep.mp3"), Ok(Command::Fetch("https://x/ep.mp3".into())));
        assert_eq!(parse("cover"), Ok(Command::Cover(None)));
        assert_eq!(parse("cover https://x/a.jpg"), Ok(Command::Cover(Some("https://x/a.jpg".into()))));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse("select 0").is_err());
        assert!(parse("seek soon").is_err());
        assert!(parse("repeat sometimes").is_err());
        assert!(parse("add").is_err());
        assert!(parse("fetch").is_err());
        assert!(parse("play now").is_err());
        assert_eq!(parse("   "), Err(String::new()));
    }
}
