//! Variant assignment preview
//!
//! Shows which variant a client identity lands in without touching any
//! persisted state.

use anyhow::Result;
use clap::Args;

use share_button_study::{StudyConfig, VariationResolver, hash_fraction};

use crate::config::ConfigLoader;

#[derive(Args)]
pub struct AssignArgs {
    /// Telemetry client identity to hash
    #[arg(long)]
    pub client_id: String,

    /// Treatment override, as the manual-override preference would hold it
    #[arg(long = "override")]
    pub override_name: Option<String>,
}

pub fn run(args: AssignArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    print!("{}", render(&config, &args)?);
    Ok(())
}

fn render(config: &StudyConfig, args: &AssignArgs) -> Result<String> {
    let resolver = VariationResolver::new(config);
    let seed = resolver.seed(&args.client_id);
    let fraction = hash_fraction(&seed);
    let assignment = resolver.resolve_with(args.override_name.as_deref(), &args.client_id)?;

    let mut out = String::new();
    out.push_str(&format!("Seed:      {}\n", seed));
    out.push_str(&format!("Fraction:  {:.6}\n", fraction));
    out.push_str(&format!("Variant:   {}\n", assignment.variant.name));
    out.push_str(&format!("Treatment: {}\n", assignment.treatment));
    out.push_str(&format!("Source:    {}\n", assignment.source));
    Ok(out)
}
