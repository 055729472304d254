use crate::download::{DownloadOutcome, DownloadPipeline, HttpFetcher};
use crate::error::{DownloadError, StoreError};
use crate::live::{combine_latest, LiveStream};
use crate::models::{Apk, Categoria};
use crate::service::DataAccessService;
use crate::store::DocumentStore;
use tokio::sync::watch;

/// Empty filter passes everything; otherwise exact `categoria_id` match.
pub fn filter_apks(apks: &[Apk], filter: &str) -> Vec<Apk> {
    if filter.is_empty() {
        return apks.to_vec();
    }
    apks.iter()
        .filter(|apk| apk.categoria_id == filter)
        .cloned()
        .collect()
}

/// APK catalog joined with a category selector.
///
/// Holds its subscriptions for as long as it lives; `deactivate` (or drop)
/// releases all of them.
pub struct ApkListView {
    apks: LiveStream<Vec<Apk>>,
    categorias: LiveStream<Vec<Categoria>>,
    filter: watch::Sender<String>,
    filtered: LiveStream<Vec<Apk>>,
}

impl ApkListView {
    pub async fn activate<S: DocumentStore>(
        service: &DataAccessService<S>,
    ) -> Result<Self, StoreError> {
        let apks = service.apks().await?;
        let categorias = service.categorias().await?;
        let (filter, filter_rx) = watch::channel(String::new());
        let filtered = combine_latest(apks.subscribe(), filter_rx, |apks: &Vec<Apk>, f: &String| {
            filter_apks(apks, f)
        });

        log::debug!(
            "APK list active: {} apks, {} categories",
            apks.current().len(),
            categorias.current().len()
        );
        Ok(Self {
            apks,
            categorias,
            filter,
            filtered,
        })
    }

    /// Called whenever the category control changes.
    pub fn select_category(&self, categoria_id: impl Into<String>) {
        self.filter.send_replace(categoria_id.into());
    }

    pub fn selected_category(&self) -> String {
        self.filter.borrow().clone()
    }

    pub fn apks(&self) -> Vec<Apk> {
        self.apks.current()
    }

    pub fn categorias(&self) -> Vec<Categoria> {
        self.categorias.current()
    }

    /// Filtered list computed from the newest APK snapshot and the newest filter.
    pub fn filtered(&self) -> Vec<Apk> {
        let apks = self.apks.current();
        let filter = self.filter.borrow();
        filter_apks(&apks, &filter)
    }

    /// Waits for the next recomputation of the filtered list.
    pub async fn filtered_changed(&mut self) -> Result<Vec<Apk>, StoreError> {
        self.filtered.changed().await
    }

    pub async fn categorias_changed(&mut self) -> Result<Vec<Categoria>, StoreError> {
        self.categorias.changed().await
    }

    /// Download URL of the first listed APK.
    pub fn first_apk_url(&self) -> Option<String> {
        let url = self.apks.current().first().map(|apk| apk.apk_url.clone());
        if url.is_none() {
            log::info!("No APKs found");
        }
        url
    }

    /// Runs the download pipeline; failures are logged here and returned.
    pub async fn download_apk<F: HttpFetcher>(
        &self,
        pipeline: &DownloadPipeline<F>,
        apk_url: &str,
    ) -> Result<DownloadOutcome, DownloadError> {
        pipeline.run(apk_url).await.map_err(|e| {
            log::error!("Failed to download or save APK from {}: {}", apk_url, e);
            e
        })
    }

    /// Releases every subscription now.
    pub fn deactivate(self) {
        let Self {
            apks,
            categorias,
            filtered,
            ..
        } = self;
        filtered.release();
        apks.release();
        categorias.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apk(id: &str, categoria: &str) -> Apk {
        Apk {
            id: id.to_string(),
            apk_url: format!("https://cdn.example.com/{}.apk", id),
            categoria_id: categoria.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_filter_is_identity() {
        let apks = vec![apk("1", "games"), apk("2", ""), apk("3", "tools")];
        assert_eq!(filter_apks(&apks, ""), apks);
    }

    #[test]
    fn test_filter_exact_match() {
        let apks = vec![apk("1", "games"), apk("2", "tools")];
        let ids: Vec<_> = filter_apks(&apks, "games")
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec!["1"]);

        // No normalization
        assert!(filter_apks(&apks, "Games").is_empty());
        assert!(filter_apks(&apks, "games ").is_empty());
    }

    #[test]
    fn test_filter_edge_cases() {
        assert!(filter_apks(&[], "games").is_empty());
        assert!(filter_apks(&[], "").is_empty());
        assert!(filter_apks(&[apk("1", "games")], "music").is_empty());
    }
}
