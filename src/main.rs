use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use skycast_core::{AppError, Config};
use skycast_services::{ServiceError, Settings};
use skycast_weather::convert::{convert_speed, convert_temperature, format_temperature};
use skycast_weather::{
    daily_summaries, CancellationToken, LocationQuery, SpeedUnit, TemperatureUnit, WeatherData,
};

mod app;

use app::App;

#[derive(Parser)]
#[command(version, about = "Weather for the cities you track", long_about = None)]
#[command(propagate_version = true)]
#[command(name = "skycast")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Current conditions for a tracked city id, "lat,lon", a provider
    /// city id, or a city name
    Weather { location: String },
    /// Forecast for the same kinds of location
    Forecast {
        location: String,
        /// Summarize per day instead of listing every step
        #[arg(long)]
        daily: bool,
    },
    /// Keep current conditions for a tracked city up to date
    Watch {
        city_id: String,
        /// Minutes between refreshes; defaults to the interval in settings
        #[arg(long)]
        every: Option<u64>,
    },
    /// City suggestions for a partial name
    Search { query: String },
    #[command(subcommand)]
    Cities(CityCommand),
    #[command(subcommand)]
    Settings(SettingsCommand),
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
enum CityCommand {
    List,
    /// Track a city by place id (see `search`)
    Add { place_id: String },
    Remove { id: String },
    Favorite { id: String },
    /// Move the city at one position to another (0-based)
    Move { from: usize, to: usize },
}

#[derive(Subcommand)]
enum SettingsCommand {
    Show,
    /// celsius, fahrenheit or kelvin
    Unit { unit: String },
    Reset,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Validate the configuration and report problems
    Check,
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    skycast_core::init()?;
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Config(command) => return config_command(command),
        command => run(command).await,
    };

    if let Err(e) = result {
        match e.downcast_ref::<AppError>() {
            Some(app_error) => eprintln!("{}", app_error.user_message()),
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn run(command: Commands) -> Result<()> {
    let app = App::new()?;

    match command {
        Commands::Weather { location } => {
            let settings = app.settings().load();
            let data = current_weather(&app, &location).await?;
            print_weather(&data, &app, &settings);
        }
        Commands::Forecast { location, daily } => {
            let settings = app.settings().load();
            let client = app.weather_client()?;
            let query = resolve_location(&app, &location);
            let forecast = client
                .forecast(&query, &CancellationToken::new())
                .await
                .map_err(AppError::from)?;

            println!("{}", forecast.location.name);
            if daily {
                for day in daily_summaries(&forecast)
                    .iter()
                    .take(usize::from(settings.display.forecast_days))
                {
                    println!(
                        "  {}  {:>6} / {:>6}  {}",
                        day.date,
                        temperature(day.high, &app, &settings),
                        temperature(day.low, &app, &settings),
                        day.condition.description()
                    );
                }
            } else {
                for point in &forecast.points {
                    println!(
                        "  {}  {:>6}  {}",
                        point
                            .timestamp
                            .format(&format!("%a {}", settings.units.time_format.pattern())),
                        temperature(point.temperature, &app, &settings),
                        point.condition.description
                    );
                }
            }
        }
        Commands::Watch { city_id, every } => watch(&app, &city_id, every).await?,
        Commands::Search { query } => {
            let search = app.places()?;
            let predictions = search.suggest(&query).await.map_err(AppError::from)?;
            if predictions.is_empty() {
                println!("No matches");
            }
            for p in predictions {
                println!("{}  {}", p.place_id, p.description);
            }
        }
        Commands::Cities(command) => cities_command(&app, command).await?,
        Commands::Settings(command) => settings_command(&app, command)?,
        Commands::Config(_) => {}
    }

    Ok(())
}

/// Tracked cities go through the cached service; anything else is a
/// direct lookup.
async fn current_weather(app: &App, location: &str) -> Result<WeatherData> {
    let cities = app.cities();
    if let Some(city) = cities.get(location) {
        let resource = app.weather()?.current(city);
        return Ok(resource.load().await.map_err(AppError::from)?);
    }

    let client = app.weather_client()?;
    let query = resolve_location(app, location);
    Ok(client
        .current_weather(&query, &CancellationToken::new())
        .await
        .map_err(AppError::from)?)
}

fn resolve_location(app: &App, location: &str) -> LocationQuery {
    if let Some(city) = app.cities().get(location) {
        return city.location_query();
    }
    parse_location(location)
}

fn parse_location(input: &str) -> LocationQuery {
    let input = input.trim();
    if let Some((lat, lon)) = input.split_once(',') {
        if let (Ok(lat), Ok(lon)) = (lat.trim().parse::<f64>(), lon.trim().parse::<f64>()) {
            return LocationQuery::coordinates(lat, lon);
        }
    }
    if let Ok(id) = input.parse::<u64>() {
        return LocationQuery::CityId(id);
    }
    LocationQuery::Name(input.to_string())
}

async fn watch(app: &App, city_id: &str, every: Option<u64>) -> Result<()> {
    let cities = app.cities();
    let city = cities
        .get(city_id)
        .ok_or_else(|| AppError::from(skycast_core::CityError::NotFound(city_id.to_string())))?;
    let settings = app.settings().load();
    let interval = match every {
        Some(minutes) => Some(Duration::from_secs(minutes.max(1) * 60)),
        // auto-refresh switched off for this installation
        None if app.config().refresh.interval_minutes == 0 => None,
        None => Some(settings.data.refresh_interval()),
    };

    let resource = app.weather()?.current(city);
    let mut updates = resource.subscribe();
    if let Err(e) = resource.load().await {
        if !e.is_cancelled() {
            eprintln!("{}", e.user_message());
        }
    }

    let Some(interval) = interval else {
        if let Some(data) = &resource.state().data {
            print_weather(data, app, &settings);
        }
        return Ok(());
    };
    resource.start_auto_refresh(interval);
    println!(
        "Watching {} every {} min, Ctrl-C to stop",
        city.display_name(),
        interval.as_secs() / 60
    );

    loop {
        {
            let state = updates.borrow_and_update();
            if let Some(data) = &state.data {
                print_weather(data, app, &settings);
            }
            if let Some(error) = &state.error {
                eprintln!("{}", error);
            }
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    resource.stop();
    Ok(())
}

async fn cities_command(app: &App, command: CityCommand) -> Result<()> {
    let mut cities = app.cities();

    match command {
        CityCommand::List => {
            if cities.is_empty() {
                println!("No cities tracked yet. Use `skycast search` and `skycast cities add`.");
            }
            for (i, city) in cities.list().iter().enumerate() {
                let star = if city.is_favorite { "*" } else { " " };
                println!("{:>2} {} {:<24} {}", i, star, city.id, city.display_name());
            }
        }
        CityCommand::Add { place_id } => {
            let city = app
                .places()?
                .resolve(&place_id)
                .await
                .map_err(AppError::from)?;
            let name = city.display_name();
            cities.add(city).map_err(AppError::from)?;
            println!("Added {}", name);
        }
        CityCommand::Remove { id } => {
            let city = cities.remove(&id).map_err(AppError::from)?;
            println!("Removed {}", city.display_name());
        }
        CityCommand::Favorite { id } => {
            let favorite = cities.toggle_favorite(&id).map_err(AppError::from)?;
            let status = if favorite {
                "is now a favorite"
            } else {
                "is no longer a favorite"
            };
            println!("{} {}", id, status);
        }
        CityCommand::Move { from, to } => {
            cities.reorder(from, to).map_err(AppError::from)?;
        }
    }
    Ok(())
}

fn settings_command(app: &App, command: SettingsCommand) -> Result<()> {
    let store = app.settings();

    match command {
        SettingsCommand::Show => {
            println!("{}", toml::to_string_pretty(&store.load())?);
        }
        SettingsCommand::Unit { unit } => {
            let unit = match unit.to_lowercase().as_str() {
                "c" | "celsius" => TemperatureUnit::Celsius,
                "f" | "fahrenheit" => TemperatureUnit::Fahrenheit,
                "k" | "kelvin" => TemperatureUnit::Kelvin,
                other => {
                    return Err(AppError::from(ServiceError::InvalidSettings(format!(
                        "unknown temperature unit '{}'",
                        other
                    )))
                    .into())
                }
            };
            store.set_temperature_unit(unit);
        }
        SettingsCommand::Reset => store.reset(),
    }
    Ok(())
}

fn config_command(command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Path => println!("{}", Config::config_path()?.display()),
        ConfigCommand::Check => {
            let config = Config::load()?;
            let validation = config.validate();
            for error in &validation.errors {
                println!("error: {}", error);
            }
            for warning in &validation.warnings {
                println!("warning: {}", warning);
            }
            if validation.is_valid() {
                println!("Configuration OK");
            } else {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

fn temperature(value: f64, app: &App, settings: &Settings) -> String {
    let from = TemperatureUnit::for_units(app.config().weather.units);
    let to = settings.units.temperature;
    format_temperature(convert_temperature(value, from, to), to)
}

fn print_weather(data: &WeatherData, app: &App, settings: &Settings) {
    let name = data.location_name.as_deref().unwrap_or("Unknown location");
    println!(
        "{}: {}, {}",
        name,
        temperature(data.temperature, app, settings),
        data.condition.description
    );
    if settings.display.show_feels_like {
        if let Some(feels_like) = data.feels_like {
            println!("  Feels like {}", temperature(feels_like, app, settings));
        }
    }

    let wind_from = SpeedUnit::for_units(app.config().weather.units);
    let wind_to = settings.units.wind_speed;
    let pressure = settings.units.pressure;
    println!(
        "  Humidity {}%  Pressure {:.1} {}  Wind {:.1} {}",
        data.humidity,
        pressure.from_hpa(data.pressure),
        pressure.symbol(),
        convert_speed(data.wind.speed, wind_from, wind_to),
        wind_to.symbol()
    );
}
