//! Run with: cargo run -p nowplaying-detect --example detect
//!
//! Polls every platform adapter once and prints what each one sees.

use nowplaying_core::config::AdaptersConfig;
use nowplaying_core::Adapter;
use nowplaying_detect::{available_adapters, SourceDatabase, SourceFilter};

fn main() {
    let db = SourceDatabase::embedded();
    let adapters = available_adapters(&AdaptersConfig::default(), SourceFilter::All, &db);

    if adapters.is_empty() {
        println!("No media adapters available on this platform.");
        return;
    }

    for (mut adapter, _) in adapters {
        println!("[{}]", adapter.name());
        match adapter.poll() {
            Ok(candidates) if candidates.is_empty() => println!("  nothing playing"),
            Ok(candidates) => {
                for c in candidates {
                    println!("  Source: {}", c.source);
                    println!("    Title:  {}", c.title);
                    if !c.artist.is_empty() {
                        println!("    Artist: {}", c.artist);
                    }
                    if let Some(status) = c.status {
                        println!("    Status: {status}");
                    }
                }
            }
            Err(e) => println!("  error: {e}"),
        }
        println!();
    }
}
