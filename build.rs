use anyhow::Result;
use vergen::EmitBuilder;

// Feeds the long version banner of the `dg200` binary.
fn main() -> Result<()> {
    EmitBuilder::builder()
        .build_date()
        .git_sha(true)
        .emit()?;
    Ok(())
}
