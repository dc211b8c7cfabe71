//! Replay a short synthetic ride and print the reports

use lightspeed::geo::EARTH_RADIUS_M;
use lightspeed::types::{AudioResource, Position, TriggerConfig};
use lightspeed::{replay_fixes, FirstFixPolicy, ProcessorConfig};

fn main() {
    let speeds_kmh = [4.0, 12.0, 18.0, 22.0, 8.0, 6.0, 5.0, 3.0];
    let mut meters = 0.0;
    let mut fixes = vec![Position::new(52.2297, 21.0122, 0)];
    for (i, speed) in speeds_kmh.iter().enumerate() {
        meters += speed / 3.6 * 2.0;
        let latitude = 52.2297 + (meters / EARTH_RADIUS_M).to_degrees();
        fixes.push(Position::new(latitude, 21.0122, (i as i64 + 1) * 2000));
    }

    let config = ProcessorConfig {
        trigger: TriggerConfig {
            threshold_kmh: 15.0,
            enabled: true,
            audio_resource: Some(AudioResource::new("demo.mp3")),
            ..Default::default()
        },
        first_fix: FirstFixPolicy::SeedOnly,
    };

    match replay_fixes(&fixes, config) {
        Ok(outcome) => {
            for report in &outcome.reports {
                match serde_json::to_string(report) {
                    Ok(line) => println!("{line}"),
                    Err(e) => eprintln!("Error: {e:?}"),
                }
            }
            eprintln!("audio commands: {:?}", outcome.commands);
        }
        Err(e) => eprintln!("Error: {e:?}"),
    }
}
