use iptv_aggregator_lib::emitter::{text_to_m3u, EmitOptions};
use iptv_aggregator_lib::parser::{detect_format, m3u_to_text, SourceFormat};
use iptv_aggregator_lib::{text, AppConfig};

fn main() -> Result<(), anyhow::Error> {
    let mut args = std::env::args().skip(1);
    let (Some(input), Some(output)) = (args.next(), args.next()) else {
        println!("usage: convert_playlist <input> <output>");
        println!("M3U input is flattened to name,url lines; text input becomes M3U.");
        return Ok(());
    };

    let source = text::decode(&std::fs::read(&input)?);
    let converted = match detect_format(&source) {
        SourceFormat::M3u => m3u_to_text(&source),
        SourceFormat::Text => {
            let config = AppConfig::load(AppConfig::default_path().as_deref())?;
            text_to_m3u(&source, &EmitOptions::from_config(&config, None))
        }
    };
    std::fs::write(&output, converted)?;
    println!("Wrote {}", output);
    Ok(())
}
