//! fota-coap — demo FOTA client.
//!
//! Usage: `fota-coap [host] [port] [report-path]`. Reports the device
//! identity, prints the server directive, and downloads the firmware image
//! when the directive announces one.

use anyhow::{Context, Result};
use fota_coap_core::{BlockControl, ClientConfig, DeviceReport, FotaClient, ServerDirective};

const DEFAULT_HOST: &str = "192.168.1.16";
const DEFAULT_PORT: u16 = 5683;
const DEFAULT_REPORT_PATH: &str = "fw";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = args
        .next()
        .map(|p| p.parse::<u16>())
        .transpose()
        .context("invalid port")?
        .unwrap_or(DEFAULT_PORT);
    let report_path = args
        .next()
        .unwrap_or_else(|| DEFAULT_REPORT_PATH.to_string());

    let report = DeviceReport {
        version: "1.0.0".to_string(),
        model: "Model 1".to_string(),
        serial: "00001".to_string(),
        manufacturer: "Lab5e AS".to_string(),
    };

    let mut client = FotaClient::connect(&host, port, ClientConfig::default())
        .context("cannot open session")?;
    let mut directive = ServerDirective::default();
    client
        .send_report(&report_path, &report, &mut directive)
        .context("report exchange failed")?;
    tracing::info!(
        host = %directive.host,
        port = directive.port,
        path = %directive.path,
        available = directive.update_available,
        "server directive"
    );

    if !directive.update_available {
        tracing::info!("no update available, done");
        return Ok(());
    }

    // The directive may redirect to a different image server.
    let (image_host, image_port) = if directive.host.is_empty() {
        (host, port)
    } else {
        (directive.host.clone(), directive.port as u16)
    };
    let mut image_client = FotaClient::connect(&image_host, image_port, ClientConfig::default())
        .context("cannot open image session")?;

    let mut image = Vec::new();
    let stats = image_client
        .download(&directive.path, |is_last, offset, chunk| {
            tracing::info!(offset, bytes = chunk.len(), is_last, "received block");
            image.extend_from_slice(chunk);
            BlockControl::Continue
        })
        .context("firmware download failed")?;
    tracing::info!(
        blocks = stats.blocks,
        bytes = stats.bytes,
        "firmware image downloaded"
    );

    image_client.close();
    client.close();
    Ok(())
}
