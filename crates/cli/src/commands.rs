use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Read delimited records and dispatch them to every configured sink
    Run {
        #[arg(long, help = "Sink config file path")]
        config: PathBuf,

        #[arg(long, help = "Input file; standard input when omitted")]
        input: Option<PathBuf>,

        #[arg(long, default_value_t = '\t', help = "Field delimiter of the input lines")]
        delimiter: char,

        #[arg(long, help = "Load ${VAR} values from this .env file")]
        env_file: Option<PathBuf>,

        #[arg(long, default_value_t = 1, help = "Number of concurrent producers")]
        producers: usize,
    },
    /// Validate the config and print the insert statement of every database sink
    Check {
        #[arg(long, help = "Sink config file path")]
        config: PathBuf,

        #[arg(long, help = "Load ${VAR} values from this .env file")]
        env_file: Option<PathBuf>,
    },
    /// Connect to every database sink and run a trivial query
    Ping {
        #[arg(long, help = "Sink config file path")]
        config: PathBuf,

        #[arg(long, help = "Load ${VAR} values from this .env file")]
        env_file: Option<PathBuf>,
    },
}
