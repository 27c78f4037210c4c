use natal_core::{
    compute_julian_day, logging, time::offset_from_longitude, ChartAssembler, ChartConfig,
    ChartError, ChartResult, EphemerisAdapter, EphemerisProvider, GeoLocation, TransitAnalyzer,
};
use std::env;
use std::sync::Arc;
use tracing::error;

#[cfg(feature = "swisseph")]
fn default_ephemeris() -> Arc<dyn EphemerisProvider> {
    let path = env::var_os("NATAL_EPHE_PATH").map(std::path::PathBuf::from);
    Arc::new(natal_core::SwissEphemeris::new(path))
}

#[cfg(not(feature = "swisseph"))]
fn default_ephemeris() -> Arc<dyn EphemerisProvider> {
    Arc::new(natal_core::AnalyticEphemeris::new())
}

fn ephemeris(config: &ChartConfig) -> ChartResult<Arc<dyn EphemerisProvider>> {
    #[cfg(feature = "horizons")]
    if env::var("NATAL_EPHEMERIS").as_deref() == Ok("horizons") {
        let horizons = natal_core::HorizonsEphemeris::new(config.ephemeris_timeout)?;
        return Ok(Arc::new(horizons));
    }
    #[cfg(not(feature = "horizons"))]
    let _ = config;
    Ok(default_ephemeris())
}

async fn print_chart(
    config: &ChartConfig,
    adapter: EphemerisAdapter,
    args: &[String],
) -> ChartResult<()> {
    let parse = |value: &str, field: &str| -> ChartResult<f64> {
        value
            .parse()
            .map_err(|_| ChartError::invalid_input(format!("{field} `{value}` is not a number")))
    };
    let latitude = parse(&args[2], "latitude")?;
    let longitude = parse(&args[3], "longitude")?;
    let offset = match args.get(4) {
        Some(value) => parse(value, "timezone offset")?,
        None => offset_from_longitude(longitude),
    };

    let jd = compute_julian_day(&args[0], &args[1], offset)?;
    let location = GeoLocation::new(latitude, longitude, Some(offset));
    let chart = ChartAssembler::new(adapter, config.house_system)
        .assemble(None, jd, &location)
        .await?;

    println!("Natal chart ({} houses, JD {jd:.5}):", config.house_system);
    print!("{chart}");
    if !chart.is_complete() {
        println!("unavailable: {:?}", chart.skipped);
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    logging::init_tracing("warn");

    let config = match ChartConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(2);
        }
    };
    let provider = match ephemeris(&config) {
        Ok(provider) => provider,
        Err(e) => {
            error!(error = %e, "ephemeris backend unavailable");
            std::process::exit(1);
        }
    };
    let adapter = EphemerisAdapter::new(provider, config.ephemeris_timeout);

    let args: Vec<String> = env::args().skip(1).collect();
    match args.len() {
        0 => {
            let report = TransitAnalyzer::new(adapter).sky_report(chrono::Utc::now()).await;
            println!("{report}");
        }
        4 | 5 => {
            if let Err(e) = print_chart(&config, adapter, &args).await {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
        _ => {
            eprintln!("Usage: natal [<YYYY-MM-DD> <HH:MM[:SS]> <latitude> <longitude> [<utc offset hours>]]");
            eprintln!("Example: natal 1991-06-18 07:10 10.522 76.172 5.5");
            std::process::exit(2);
        }
    }
}
