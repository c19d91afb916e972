use affinity_core::PlacementConfig;

pub fn print_default() -> anyhow::Result<()> {
    print!("{}", PlacementConfig::default().to_toml_string()?);
    Ok(())
}
