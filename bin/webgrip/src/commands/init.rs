use webgrip_core::{Config, Paths};

pub fn run(force: bool) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config_path = paths.config_file();

    if config_path.exists() && !force {
        println!(
            "Config already exists at {} (use --force to overwrite)",
            config_path.display()
        );
        return Ok(());
    }

    paths.ensure_dirs()?;
    Config::default().save(&config_path)?;
    println!("Wrote default config to {}", config_path.display());
    println!("Note: TLS certificate verification is DISABLED by default.");
    Ok(())
}
