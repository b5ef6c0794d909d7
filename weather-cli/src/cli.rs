use std::{fs, path::PathBuf};

use anyhow::{Context, anyhow};
use chrono::Duration;
use clap::{Parser, Subcommand, ValueEnum};
use inquire::Text;
use serde_json::Value;
use tracing::info;
use weather_core::{
    ApiKey, Config, QueryKind, WeatherService,
    report::{self, parse_timezone},
};

use crate::logging;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(
    name = "weather",
    version,
    about = "Current weather and forecasts from OpenWeatherMap",
    long_about = "Shows the weather for a LOCATION of your choice: a city name with an \
                  optional two-letter country code (`London,UK`, `Canmore`), an OpenWeather \
                  city id, or a city registered with `weather set-city`.\n\n\
                  Responses are cached for 10 minutes. You need an API key from \
                  https://openweathermap.org/appid."
)]
pub struct Cli {
    /// Your API key for the OpenWeatherMap API.
    #[arg(long, short = 'a', env = "OPENWEATHER_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the API key (and optionally a data directory) for later runs.
    Configure {
        /// Directory for the cache, registered cities and logs.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Show a description of the current weather.
    Current { location: String },

    /// Show the current temperature with today's low and high.
    Temp { location: String },

    /// Print the raw JSON response and save it to dump.json.
    Dump {
        location: String,

        #[arg(long, value_enum, default_value_t = Kind::Current)]
        kind: Kind,
    },

    /// List registered cities.
    Cities,

    /// Register a city name with an OpenWeather city id.
    SetCity {
        name: String,

        id: u64,

        /// IANA timezone, e.g. "Europe/London".
        #[arg(long)]
        timezone: Option<String>,
    },

    /// Show the 5-day forecast, one line per day.
    Forecast { location: String },

    /// Show forecast rainfall per day and in total.
    Rain { location: String },

    /// Show today's sunrise and sunset.
    Sun { location: String },

    /// Remove cached responses for a location.
    Clear {
        location: String,

        /// Only clear this kind; both when omitted.
        #[arg(long, value_enum)]
        kind: Option<Kind>,
    },

    /// Print the log of the previous run.
    Log,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Kind {
    Current,
    Forecast,
}

impl From<Kind> for QueryKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Current => QueryKind::Current,
            Kind::Forecast => QueryKind::Forecast,
        }
    }
}

impl Cli {
    /// Whether this run should overwrite the last-run log.
    pub fn records_last_run(&self) -> bool {
        !matches!(self.command, Command::Log)
    }

    pub async fn run(self, mut config: Config) -> anyhow::Result<()> {
        match &self.command {
            Command::Configure { data_dir } => {
                let path = Config::api_key_path()?;
                let existing = ApiKey::load(&path).ok().flatten();

                let mut prompt = Text::new("Please enter your API key:");
                if let Some(key) = &existing {
                    prompt = prompt.with_default(key.as_str());
                }
                let key = ApiKey::parse(&prompt.prompt()?)?;
                key.save(&path)?;
                info!(path = %path.display(), "Saved API key");

                if let Some(dir) = data_dir {
                    config.data_dir = Some(dir.clone());
                    config.save()?;
                    info!(data_dir = %dir.display(), "Saved data directory");
                }

                println!("Configuration saved to {}", path.display());
            }

            Command::Current { location } => {
                let payload = self.fetch(&config, location, QueryKind::Current).await?;
                let conditions = report::current_conditions(&payload)?;
                println!("The weather in {location} right now: {}.", conditions.description);
            }

            Command::Temp { location } => {
                let payload = self.fetch(&config, location, QueryKind::Current).await?;
                let t = report::temperature(&payload)?;
                println!(
                    "Current temperature in {location} is {:.1}°F \
                     with a low of {:.1}°F and a high of {:.1}°F",
                    t.current, t.low, t.high
                );
            }

            Command::Dump { location, kind } => {
                let payload = self.fetch(&config, location, (*kind).into()).await?;
                let pretty = serde_json::to_string_pretty(&payload)?;
                println!("{pretty}");

                let path = config.data_dir()?.join("dump.json");
                fs::write(&path, pretty)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!(path = %path.display(), "Dumped JSON");
            }

            Command::Cities => {
                let service = WeatherService::from_config(&config)?;
                let entries = service.directory().list();

                if entries.is_empty() {
                    println!("No cities registered. Hint: run `weather set-city <NAME> <ID>`.");
                }
                for entry in entries {
                    println!(
                        "{:<24} {:>10}  {}",
                        entry.name,
                        entry.provider_id,
                        entry.timezone().unwrap_or("-")
                    );
                }
            }

            Command::SetCity { name, id, timezone } => {
                if let Some(tz) = timezone {
                    parse_timezone(tz)?;
                }

                let mut service = WeatherService::from_config(&config)?;
                let entry = service.directory_mut().upsert(name, *id, timezone.as_deref());
                service.directory().save()?;

                info!(name = %entry.name, id = entry.provider_id, "Registered city");
                println!("{} -> {}", entry.name, entry.provider_id);
            }

            Command::Forecast { location } => {
                let payload = self.fetch(&config, location, QueryKind::Forecast).await?;
                for day in report::daily_forecast(&payload)? {
                    println!(
                        "{}  low {:>5.1}°F  high {:>5.1}°F  {}",
                        day.date.format("%a %b %d"),
                        day.low,
                        day.high,
                        day.description
                    );
                }
            }

            Command::Rain { location } => {
                let payload = self.fetch(&config, location, QueryKind::Forecast).await?;
                let totals = report::rain_totals(&payload)?;
                for (date, amount) in &totals.per_day {
                    println!("{}  {:.1} mm", date.format("%a %b %d"), amount);
                }
                println!("Total rainfall expected in {location}: {:.1} mm", totals.total);
            }

            Command::Sun { location } => {
                let key = self.api_key()?;
                let service = WeatherService::from_config(&config)?;
                let tz = match service.directory().lookup(location) {
                    Some(entry) => entry.timezone().map(parse_timezone).transpose()?,
                    None => None,
                };

                let payload = service.fetch(location, QueryKind::Current, &key).await?;
                let daylight = report::daylight(&payload, tz)?;

                println!("Sunrise:  {}", daylight.sunrise.format("%H:%M %Z"));
                println!("Sunset:   {}", daylight.sunset.format("%H:%M %Z"));
                println!("Daylight: {}", format_duration(daylight.length()));
            }

            Command::Clear { location, kind } => {
                let service = WeatherService::from_config(&config)?;
                let kinds = match kind {
                    Some(kind) => vec![QueryKind::from(*kind)],
                    None => QueryKind::all().to_vec(),
                };

                for kind in kinds {
                    let age = service.cache_age(location, kind)?;
                    if service.clear(location, kind)? {
                        let age = age.map(format_duration).unwrap_or_default();
                        println!("Cleared cached {kind} data for {location} (fetched {age} ago)");
                    } else {
                        println!("No cached {kind} data for {location}");
                    }
                }
            }

            Command::Log => match logging::read_last_run(&config.log_dir()?)? {
                Some(contents) => print!("{contents}"),
                None => println!("No log from a previous run."),
            },
        }

        Ok(())
    }

    async fn fetch(
        &self,
        config: &Config,
        location: &str,
        kind: QueryKind,
    ) -> anyhow::Result<Value> {
        // Reject a bad key before touching the cache or the network.
        let key = self.api_key()?;
        let service = WeatherService::from_config(config)?;
        Ok(service.fetch(location, kind, &key).await?)
    }

    /// `--api-key` / `OPENWEATHER_API_KEY`, else the stored key file.
    fn api_key(&self) -> anyhow::Result<ApiKey> {
        if let Some(key) = &self.api_key {
            return Ok(ApiKey::parse(key)?);
        }

        let path = Config::api_key_path()?;
        ApiKey::load(&path)?.ok_or_else(|| {
            anyhow!(
                "No API key configured.\n\
                 Hint: run `weather configure` or pass `--api-key`."
            )
        })
    }
}

fn format_duration(d: Duration) -> String {
    let minutes = d.num_minutes();
    if minutes < 1 {
        return format!("{}s", d.num_seconds().max(0));
    }
    if minutes < 60 {
        return format!("{minutes}m");
    }
    format!("{}h {:02}m", minutes / 60, minutes % 60)
}
