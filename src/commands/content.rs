use anyhow::{Context, Result};

use postpilot::config::Config;

/// Add a caption to the content pool
pub fn caption_add(config: Config, text: String, category: Option<String>) -> Result<()> {
    let store = super::open_store(&config)?;
    let caption = store
        .create_caption(&text, category.as_deref())
        .context("Failed to create caption")?;

    println!("Caption added");
    println!("  ID: {}", caption.id);
    println!("  Text: {}", caption.text);
    if let Some(cat) = &caption.category {
        println!("  Category: {cat}");
    }

    Ok(())
}

/// Add an image asset to the content pool
pub fn image_add(config: Config, url: String) -> Result<()> {
    let store = super::open_store(&config)?;
    let image = store.create_image(&url).context("Failed to create image")?;

    println!("Image added");
    println!("  ID: {}", image.id);
    println!("  URL: {}", image.url);

    Ok(())
}
