#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Tunnel,
    Title(String),
    Status,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(w, r)| (w, r.trim()));

        match word.to_ascii_lowercase().as_str() {
            "" => Self::Empty,
            "start" => Self::Start,
            "stop" => Self::Stop,
            "tunnel" => Self::Tunnel,
            "title" => Self::Title(rest.to_string()),
            "status" => Self::Status,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            _ => Self::Unknown(word.to_string()),
        }
    }
}

pub const HELP: &str = "\
Commands:
  start          start the media engine and web server
  stop           stop them again
  tunnel         start or stop the public tunnel
  title <text>   change the viewer page title
  status         show services and listeners
  quit           stop everything and exit";
