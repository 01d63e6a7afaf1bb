use log::info;

use crate::Pijulfetch;

/// Handler to fetch command
pub fn do_fetch(pijulfetch: &Pijulfetch, url: &str, name: Option<&str>) -> anyhow::Result<()> {
    let fetched = pijulfetch.fetch(url, name)?;
    info!("Fetched {} into {}", url, fetched.path.display());

    println!("url = \"{}\"", fetched.input.to_url()?);
    println!("path = \"{}\"", fetched.path.display());
    if let Some(last_modified) = fetched.input.last_modified() {
        println!("lastModified = {last_modified}");
    }
    Ok(())
}

/// Handler to lock command
pub fn do_lock(pijulfetch: &Pijulfetch, url: &str) -> anyhow::Result<()> {
    let locked = pijulfetch.lock(url)?;
    println!("{locked}");
    Ok(())
}

pub fn do_clear_cache(pijulfetch: &Pijulfetch) -> anyhow::Result<()> {
    pijulfetch.clear_cache()
}

pub fn do_clear_store(pijulfetch: &Pijulfetch) -> anyhow::Result<()> {
    pijulfetch.clear_store()
}
