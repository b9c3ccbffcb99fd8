//! Content selection for posting attempts
//!
//! Captions go through a fallback chain tuned to avoid repeats without ever
//! blocking a post over bookkeeping: fresh unused material first, reuse
//! second, repeating the previous caption as a last resort, and only an
//! entirely empty caption table stops the attempt. Images are a single
//! uniform pick from a bounded pool; their selection counter is bumped at
//! pick time regardless of how the post turns out.

use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::models::{Account, Caption, ImageAsset};
use crate::store::{SharedStore, StoreResult};

/// Picks captions and images for one posting attempt
pub struct ContentSelector {
    store: SharedStore,
    sample_size: usize,
}

impl ContentSelector {
    /// `sample_size` bounds every candidate pull from the store
    pub fn new(store: SharedStore, sample_size: usize) -> Self {
        Self { store, sample_size }
    }

    /// Pick a caption for an account
    ///
    /// Fallback order:
    /// 1. uniform pick from a bounded random sample of unused captions,
    ///    excluding the account's previous caption
    /// 2. any caption, used or not, still excluding the previous one
    /// 3. any caption at all, repeat included
    /// 4. `None` when the caption table is empty
    pub fn pick_caption(&self, account: &Account) -> StoreResult<Option<Caption>> {
        let exclude = account.last_caption_id;

        let sample = self
            .store
            .sample_unused_captions(exclude, self.sample_size)?;
        let mut rng = rand::thread_rng();
        if let Some(caption) = sample.choose(&mut rng) {
            return Ok(Some(caption.clone()));
        }

        if let Some(caption) = self.store.random_caption(exclude)? {
            debug!(
                account = %account.username,
                caption_id = caption.id,
                "no unused captions left, reusing an older one"
            );
            return Ok(Some(caption));
        }

        // the excluded caption may be the only row in the table
        if let Some(caption) = self.store.random_caption(None)? {
            debug!(
                account = %account.username,
                caption_id = caption.id,
                "repeating the previous caption, nothing else available"
            );
            return Ok(Some(caption));
        }

        warn!(account = %account.username, "caption table is empty, cannot post");
        Ok(None)
    }

    /// Pick an image, bumping its selection counter
    ///
    /// `None` when no images exist; the attempt then proceeds text-only.
    pub fn pick_image(&self) -> StoreResult<Option<ImageAsset>> {
        let pool = self.store.sample_images(self.sample_size)?;
        let mut rng = rand::thread_rng();
        match pool.choose(&mut rng) {
            Some(image) => {
                self.store.increment_image_use(image.id)?;
                Ok(Some(image.clone()))
            }
            None => Ok(None),
        }
    }
}
