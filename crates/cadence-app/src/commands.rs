//! Prompt command parsing.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use anyhow::{anyhow, bail, Context, Result};
use cadence_core::FilterKind;

pub const HELP: &str = "\
commands:
  play <query|url>       start a new session with the first match
  add <query|url>        queue the first match
  pause | resume         pause or resume playback
  skip                   skip the current track
  stop                   stop and drop the session
  volume <percent>       set volume (100 is the default)
  filter <+name|-name>.. toggle filters, e.g. `filter +nightcore -bassboost`
  filters                list enabled filters
  repeat <on|off>        loop the current track
  shuffle                shuffle the upcoming tracks
  queue                  show the queue
  clear                  drop the upcoming tracks
  remove <n>             remove the n-th upcoming track
  np                     show the current track and position
  leave                  simulate the last listener leaving
  help | quit";

/// A parsed prompt line.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Play(String),
    Add(String),
    Pause,
    Resume,
    Skip,
    Stop,
    Volume(u16),
    Filter(Vec<(FilterKind, bool)>),
    Filters,
    Repeat(bool),
    Shuffle,
    Queue,
    Clear,
    /// Zero-based index into the upcoming tracks.
    Remove(usize),
    NowPlaying,
    Leave,
    Help,
    Quit,
}

/// Parse one line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Input>> {
    let line = line.trim();
    let Some(word) = line.split_whitespace().next() else {
        return Ok(None);
    };
    let rest = line[word.len()..].trim();

    let input = match word.to_ascii_lowercase().as_str() {
        "play" | "p" => Input::Play(query(rest)?),
        "add" | "a" => Input::Add(query(rest)?),
        "pause" => Input::Pause,
        "resume" => Input::Resume,
        "skip" | "s" => Input::Skip,
        "stop" => Input::Stop,
        "volume" | "vol" => Input::Volume(
            rest.parse()
                .with_context(|| format!("invalid volume: {rest:?}"))?,
        ),
        "filter" | "f" => Input::Filter(toggles(rest)?),
        "filters" => Input::Filters,
        "repeat" | "loop" => Input::Repeat(switch(rest)?),
        "shuffle" => Input::Shuffle,
        "queue" | "q" => Input::Queue,
        "clear" => Input::Clear,
        "remove" | "rm" => Input::Remove(position(rest)?),
        "np" | "now" => Input::NowPlaying,
        "leave" => Input::Leave,
        "help" | "?" => Input::Help,
        "quit" | "exit" => Input::Quit,
        other => bail!("unknown command: {other} (try `help`)"),
    };
    Ok(Some(input))
}

fn query(rest: &str) -> Result<String> {
    if rest.is_empty() {
        bail!("missing search query");
    }
    Ok(rest.to_string())
}

fn switch(rest: &str) -> Result<bool> {
    match rest.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => bail!("expected on or off, got {rest:?}"),
    }
}

fn toggles(rest: &str) -> Result<Vec<(FilterKind, bool)>> {
    if rest.is_empty() {
        bail!("name at least one filter");
    }
    rest.split_whitespace()
        .map(|token| {
            let (name, enabled) = match token.as_bytes().first() {
                Some(b'-') => (&token[1..], false),
                Some(b'+') => (&token[1..], true),
                _ => (token, true),
            };
            let kind = name.parse::<FilterKind>().map_err(|e| anyhow!(e))?;
            Ok((kind, enabled))
        })
        .collect()
}

/// One-based position as shown by `queue`, turned into an index.
fn position(rest: &str) -> Result<usize> {
    let n: usize = rest
        .parse()
        .with_context(|| format!("invalid position: {rest:?}"))?;
    n.checked_sub(1)
        .ok_or_else(|| anyhow!("positions start at 1"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(line: &str) -> Input {
        parse(line).unwrap().unwrap()
    }

    #[test]
    fn test_blank_line() {
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn test_queries_keep_spacing() {
        assert_eq!(parsed("play  daft punk  "), Input::Play("daft punk".to_string()));
        assert_eq!(
            parsed("ADD https://youtu.be/abc"),
            Input::Add("https://youtu.be/abc".to_string())
        );
        assert!(parse("play").is_err());
    }

    #[test]
    fn test_volume() {
        assert_eq!(parsed("volume 50"), Input::Volume(50));
        assert_eq!(parsed("vol 150"), Input::Volume(150));
        assert!(parse("volume loud").is_err());
    }

    #[test]
    fn test_filter_toggles() {
        assert_eq!(
            parsed("filter +nightcore -bassboost 8d"),
            Input::Filter(vec![
                (FilterKind::Nightcore, true),
                (FilterKind::BassBoost, false),
                (FilterKind::EightD, true),
            ])
        );
        assert!(parse("filter +warp").is_err());
        assert!(parse("filter").is_err());
    }

    #[test]
    fn test_repeat_and_remove() {
        assert_eq!(parsed("repeat on"), Input::Repeat(true));
        assert_eq!(parsed("loop off"), Input::Repeat(false));
        assert!(parse("repeat maybe").is_err());

        assert_eq!(parsed("remove 1"), Input::Remove(0));
        assert!(parse("remove 0").is_err());
    }

    #[test]
    fn test_unknown_command() {
        assert!(parse("dance").is_err());
    }
}
