//! Flows on the card-comparison page: building a comparison, exporting one
//! Excel file per period and segment, and collecting the finished downloads
//! into a single archive.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::hash::Hasher;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::time;
use tracing::{debug, error, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::scraper::errors::{ScrapeError, ScrapeResult};
use crate::scraper::webdriver::{Browser, Element, KEY_ENTER};
use crate::scraper::{COMPARISON_URL, part_file};

// The seller UI uses hashed CSS module class names; the stable part is the
// block prefix, hence all the `^=` matches.
const CREATE_COMPARISON: &str = "[class^=\"Create-comparison-button\"]";
const ARTICLE_INPUT: &str = "[class^=\"Simple-input\"] input";
const RECOMMENDED_LIST: &str = "[class^=\"Recommended-cards__list\"]";
const CARD_DESCRIPTION: &str = "[class^=\"Nm-card__description\"]";
const CARD_CONTROL_BUTTON: &str = "[class^=\"Nm-card__control-button\"]";
const HEADER_CONTROLS: &str = "[class^=\"Recommendation-header__control-buttons\"]";
const PERIOD_FILTERS: &str = "[class^=\"Period-filters\"]";
const PARAMS_SEGMENTS: &str = "[class^=\"Params-segments\"]";
const FILTER_BUTTONS: &str = ":scope > div:first-of-type button";
const EXPORT_MODAL: &str = "[class^=\"Create-excel-modal\"]";
const OPEN_EXPORT_MODAL: &str = "[data-testid=\"Download-manager-open-modal-button-interface\"]";
const SHOW_DOWNLOADS_LIST: &str =
    "[data-testid=\"Download-manager-wrapper-show-list-button-interface\"]";
const READY_FILE_CHIP: &str = "button[data-testid=\"File-row-SUCCESS-chips-component\"]";

const TABLE_FIRST_ROW: &str = "[class^=\"Table__container\"] table tbody tr";

const CLICK_ATTEMPTS: u32 = 3;
const CLICK_RETRY_PAUSE: Duration = Duration::from_secs(2);
const DOWNLOAD_POLL: Duration = Duration::from_millis(500);

/// Numeric id tying one report batch together. Used as the export filename
/// prefix so the download pass can tell this batch's files apart.
pub fn batch_id(articles: &[i64]) -> u64 {
    let mut combined: String = articles.iter().map(|a| a.to_string()).collect();
    let sum: i64 = articles.iter().sum();
    combined.push_str("_salt_");
    combined.push_str(&sum.to_string());

    let mut hasher = rapidhash::fast::RapidHasher::default();
    hasher.write(combined.as_bytes());
    hasher.finish() % 1_000_000_000
}

/// Stand-in for [`compare_cards`]: open the first existing comparison from
/// the table instead of building a new one.
pub async fn fake_compare_cards(browser: &Browser, articles: &[i64]) -> ScrapeResult<()> {
    info!(articles = articles.len(), "opening existing comparison from table");
    browser.goto(COMPARISON_URL).await?;
    time::sleep(Duration::from_secs(3)).await;

    let first_row = browser
        .wait_visible(TABLE_FIRST_ROW, Duration::from_secs(15))
        .await?;
    if let Err(e) = browser.click(&first_row).await {
        warn!(error = ?e, "native click failed, falling back to JS click");
        browser.click_js(&first_row).await?;
    }
    time::sleep(Duration::from_secs(2)).await;

    info!("existing comparison opened");
    Ok(())
}

/// Build a comparison for the given articles on the analytics page.
pub async fn compare_cards(browser: &Browser, articles: &[i64]) -> ScrapeResult<()> {
    info!(count = articles.len(), "starting card comparison");
    browser.goto(COMPARISON_URL).await?;
    time::sleep(Duration::from_secs(3)).await;

    let create = browser
        .wait_visible(CREATE_COMPARISON, Duration::from_secs(15))
        .await?;
    browser.click(&create).await?;
    time::sleep(Duration::from_secs(1)).await;

    for (idx, article) in articles.iter().enumerate() {
        info!(article, step = idx + 1, total = articles.len(), "adding article");
        let input = browser
            .wait_visible(ARTICLE_INPUT, Duration::from_secs(15))
            .await?;
        browser.clear(&input).await?;
        browser.send_keys(&input, &article.to_string()).await?;
        time::sleep(Duration::from_secs(1)).await;
        browser.send_keys(&input, KEY_ENTER).await?;
        time::sleep(Duration::from_secs(1)).await;

        let list = browser
            .wait_visible(RECOMMENDED_LIST, Duration::from_secs(15))
            .await?;
        confirm_article_added(browser, &list, *article).await?;

        let buttons = browser.find_all_in(&list, CARD_CONTROL_BUTTON).await?;
        match buttons.last() {
            Some(button) => {
                browser.click(button).await?;
                time::sleep(Duration::from_secs(2)).await;
            }
            None => warn!(article, "no card control buttons found"),
        }
    }

    // The second header button switches into the comparison view.
    let header = browser
        .wait_visible(HEADER_CONTROLS, Duration::from_secs(15))
        .await?;
    let buttons = browser.find_all_in(&header, "button").await?;
    if buttons.len() < 2 {
        return Err(ScrapeError::UnexpectedPage(format!(
            "expected at least 2 header buttons, found {}",
            buttons.len()
        )));
    }
    browser.click(&buttons[1]).await?;
    time::sleep(Duration::from_secs(3)).await;

    info!("comparison built");
    Ok(())
}

/// The freshly added card lands at the end of the recommended list; make
/// sure it actually carries the article we just typed.
async fn confirm_article_added(
    browser: &Browser,
    list: &Element,
    article: i64,
) -> ScrapeResult<()> {
    let needle = article.to_string();
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut last_text = String::new();

    loop {
        let cards = browser.find_all_in(list, CARD_DESCRIPTION).await?;
        if let Some(card) = cards.last() {
            // stale handles between re-renders read as empty and get retried
            last_text = browser.text(card).await.unwrap_or_default();
            if last_text.contains(&needle) {
                debug!(article, "article confirmed in card list");
                return Ok(());
            }
        }
        if Instant::now() >= deadline {
            return Err(ScrapeError::UnexpectedPage(format!(
                "article {article} not found in last card (card text: {last_text:?})"
            )));
        }
        time::sleep(Duration::from_millis(250)).await;
    }
}

/// Walk every period and segment filter combination, queueing one Excel
/// export for each. Returns the number of exports queued.
pub async fn process_filters(browser: &Browser, batch_id: u64) -> ScrapeResult<usize> {
    info!(batch_id, "exporting period and segment reports");
    // let the comparison view settle before poking at filters
    time::sleep(Duration::from_secs(3)).await;

    let filters = browser
        .wait_visible(PERIOD_FILTERS, Duration::from_secs(20))
        .await?;
    let period_count = browser.find_all_in(&filters, FILTER_BUTTONS).await?.len();
    info!(period_count, "period filters found");

    let mut processed = 0usize;

    for period_idx in 0..period_count {
        let period = select_nth(browser, PERIOD_FILTERS, period_idx, "period").await?;
        info!(period = period.as_str(), "period selected");
        time::sleep(Duration::from_secs(3)).await;

        let segments = browser
            .wait_visible(PARAMS_SEGMENTS, Duration::from_secs(20))
            .await?;
        let segment_count = browser.find_all_in(&segments, FILTER_BUTTONS).await?.len();
        debug!(segment_count, "segment buttons found");

        for segment_idx in 0..segment_count {
            let segment = select_nth(browser, PARAMS_SEGMENTS, segment_idx, "segment").await?;
            time::sleep(Duration::from_secs(3)).await;

            match export_current_view(browser, batch_id, &period, &segment).await {
                Ok(()) => {
                    processed += 1;
                    info!(
                        period = period.as_str(),
                        segment = segment.as_str(),
                        processed,
                        "export queued"
                    );
                }
                Err(ScrapeError::WaitTimeout { .. }) => {
                    warn!(
                        period = period.as_str(),
                        segment = segment.as_str(),
                        "export button not available, skipping"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    info!(processed, "filter processing finished");
    Ok(processed)
}

/// Re-resolve the `idx`-th filter button under `container_css` and click it,
/// retrying a few times. Clicks fail transiently while loading overlays sit
/// on top of the filter strip; re-resolving also shakes off stale handles.
async fn select_nth(
    browser: &Browser,
    container_css: &str,
    idx: usize,
    what: &str,
) -> ScrapeResult<String> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let container = browser
            .wait_visible(container_css, Duration::from_secs(20))
            .await?;
        let buttons = browser.find_all_in(&container, FILTER_BUTTONS).await?;
        let Some(button) = buttons.get(idx) else {
            return Err(ScrapeError::UnexpectedPage(format!(
                "{what} button {idx} disappeared (found {})",
                buttons.len()
            )));
        };
        let label = browser.text(button).await.unwrap_or_default();

        match browser.click(button).await {
            Ok(()) => return Ok(label),
            Err(e) if attempt < CLICK_ATTEMPTS => {
                warn!(what, idx, attempt, error = ?e, "click failed, retrying");
                time::sleep(CLICK_RETRY_PAUSE).await;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn export_current_view(
    browser: &Browser,
    batch_id: u64,
    period: &str,
    segment: &str,
) -> ScrapeResult<()> {
    let open = browser
        .wait_visible(OPEN_EXPORT_MODAL, Duration::from_secs(10))
        .await?;
    browser.click(&open).await?;
    time::sleep(Duration::from_secs(2)).await;

    let input = browser
        .wait_visible(ARTICLE_INPUT, Duration::from_secs(15))
        .await?;
    let file_name = format!("{batch_id}-{period}-{segment}");
    browser.clear(&input).await?;
    browser.send_keys(&input, &file_name).await?;
    time::sleep(Duration::from_secs(1)).await;
    debug!(file_name = file_name.as_str(), "export name entered");

    let modal = browser
        .wait_visible(EXPORT_MODAL, Duration::from_secs(15))
        .await?;
    let Some(confirm) = browser.find_in(&modal, "button").await? else {
        return Err(ScrapeError::UnexpectedPage(
            "export modal has no confirm button".into(),
        ));
    };
    browser.click(&confirm).await?;
    time::sleep(Duration::from_secs(2)).await;
    Ok(())
}

/// Download up to `expected_count` finished exports from the download
/// manager and merge them into `{batch_id}-merged.zip` under `output_dir`.
pub async fn download_documents(
    browser: &Browser,
    staging_dir: &Path,
    output_dir: &Path,
    batch_id: u64,
    expected_count: usize,
) -> ScrapeResult<PathBuf> {
    info!(expected_count, "downloading finished reports");
    tokio::fs::create_dir_all(staging_dir)
        .await
        .map_err(anyhow::Error::from)?;
    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(anyhow::Error::from)?;

    let show = browser
        .wait_visible(SHOW_DOWNLOADS_LIST, Duration::from_secs(20))
        .await?;
    time::sleep(Duration::from_secs(2)).await;
    browser.click(&show).await?;
    time::sleep(Duration::from_secs(3)).await;
    debug!("download list opened");

    // Exports render server-side; the ready chips can take a while to appear.
    browser
        .wait_visible(READY_FILE_CHIP, Duration::from_secs(90))
        .await?;
    time::sleep(Duration::from_secs(5)).await;

    let chips = browser.find_all(READY_FILE_CHIP).await?;
    let to_download = chips.len().min(expected_count);
    info!(available = chips.len(), to_download, "ready files in download list");

    let mut downloaded: Vec<PathBuf> = Vec::new();
    for idx in 0..to_download {
        // the list may re-render between clicks, re-resolve each time
        let chips = browser.find_all(READY_FILE_CHIP).await?;
        let Some(chip) = chips.get(idx) else {
            warn!(idx, "download list shrank mid-pass");
            break;
        };
        if let Err(e) = browser.scroll_into_view(chip).await {
            debug!(error = ?e, "scroll before download failed");
        }
        time::sleep(Duration::from_secs(1)).await;

        let before = list_zip_files(staging_dir).await?;
        if let Err(e) = browser.click(chip).await {
            warn!(idx, error = ?e, "failed to click download chip");
            continue;
        }
        match wait_for_download(staging_dir, &before, Duration::from_secs(45)).await {
            Ok(path) => {
                debug!(path = %path.display(), "file downloaded");
                downloaded.push(path);
            }
            Err(e) => warn!(idx, error = ?e, "download did not complete"),
        }
        time::sleep(Duration::from_secs(2)).await;
    }

    info!(downloaded = downloaded.len(), "download pass finished");
    if downloaded.is_empty() {
        return Err(ScrapeError::UnexpectedPage("no files were downloaded".into()));
    }

    let sources = downloaded.clone();
    let out = output_dir.to_path_buf();
    tokio::task::spawn_blocking(move || merge_archives(&sources, &out, batch_id))
        .await
        .map_err(|e| ScrapeError::Other(anyhow::anyhow!("merge task panicked: {e}")))?
}

async fn list_zip_files(dir: &Path) -> ScrapeResult<HashSet<PathBuf>> {
    let mut out = HashSet::new();
    let mut entries = tokio::fs::read_dir(dir).await.map_err(anyhow::Error::from)?;
    while let Some(entry) = entries.next_entry().await.map_err(anyhow::Error::from)? {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "zip") {
            out.insert(path);
        }
    }
    Ok(out)
}

/// Wait for a zip that was not in `before` to finish landing in `dir`.
///
/// Firefox streams into a `.part` sidecar and renames on completion; a file
/// counts as done once the sidecar is gone and its size held steady across
/// two polls.
async fn wait_for_download(
    dir: &Path,
    before: &HashSet<PathBuf>,
    timeout: Duration,
) -> ScrapeResult<PathBuf> {
    let deadline = Instant::now() + timeout;
    let mut candidates: HashMap<PathBuf, u64> = HashMap::new();

    loop {
        for path in list_zip_files(dir).await? {
            if before.contains(&path) {
                continue;
            }
            if tokio::fs::try_exists(&part_file(&path)).await.unwrap_or(false) {
                continue;
            }
            let size = match tokio::fs::metadata(&path).await {
                Ok(m) => m.len(),
                Err(_) => continue,
            };
            if size == 0 {
                continue;
            }
            match candidates.get(&path) {
                Some(&prev) if prev == size => return Ok(path),
                _ => {
                    candidates.insert(path, size);
                }
            }
        }
        if Instant::now() >= deadline {
            return Err(ScrapeError::WaitTimeout {
                what: "downloaded report archive".into(),
                waited: timeout,
            });
        }
        time::sleep(DOWNLOAD_POLL).await;
    }
}

/// Merge the per-export archives into one, a folder per source archive.
/// Folder names are the source stems with the batch prefix stripped, so the
/// final archive reads `Неделя-Все/...`, `Месяц-Новинки/...` and so on.
fn merge_archives(sources: &[PathBuf], output_dir: &Path, batch_id: u64) -> ScrapeResult<PathBuf> {
    info!(count = sources.len(), "merging downloaded archives");
    let merged_path = output_dir.join(format!("{batch_id}-merged.zip"));
    let file = File::create(&merged_path).map_err(anyhow::Error::from)?;
    let mut merged = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let prefix = format!("{batch_id}-");

    for source in sources {
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("archive");
        let folder = stem.strip_prefix(&prefix).unwrap_or(stem);
        debug!(source = %source.display(), folder, "merging archive");

        let reader = match File::open(source) {
            Ok(f) => f,
            Err(e) => {
                error!(source = %source.display(), error = ?e, "failed to open archive, skipping");
                continue;
            }
        };
        let mut archive = match ZipArchive::new(BufReader::new(reader)) {
            Ok(a) => a,
            Err(e) => {
                error!(source = %source.display(), error = ?e, "failed to read archive, skipping");
                continue;
            }
        };

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(anyhow::Error::from)?;
            if entry.name().ends_with('/') {
                continue;
            }
            let Some(relative) = entry.enclosed_name() else {
                warn!(name = entry.name(), "skipping entry with unsafe path");
                continue;
            };
            let target = Path::new(folder).join(relative);
            merged
                .start_file(target.to_string_lossy().into_owned(), options)
                .map_err(anyhow::Error::from)?;
            std::io::copy(&mut entry, &mut merged).map_err(anyhow::Error::from)?;
        }
    }

    let mut inner = merged.finish().map_err(anyhow::Error::from)?;
    inner.flush().map_err(anyhow::Error::from)?;
    info!(path = %merged_path.display(), "merged archive created");

    for source in sources {
        if let Err(e) = std::fs::remove_file(source) {
            warn!(path = %source.display(), error = ?e, "failed to delete source archive");
        }
    }

    Ok(merged_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "cardcompare-{label}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        for (name, data) in entries {
            writer
                .start_file(name.to_string(), SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn batch_ids_are_stable_and_bounded() {
        let a = batch_id(&[446247009, 280177573]);
        let b = batch_id(&[446247009, 280177573]);
        let c = batch_id(&[446247009, 280177574]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a < 1_000_000_000);
        assert!(batch_id(&[]) < 1_000_000_000);
    }

    #[test]
    fn merge_groups_sources_into_folders_and_strips_prefix() {
        let dir = temp_dir("merge");
        let first = dir.join("777-Неделя-Все.zip");
        let second = dir.join("777-Месяц-Новинки.zip");
        write_zip(&first, &[("report.xlsx", b"week data")]);
        write_zip(&second, &[("report.xlsx", b"month data"), ("extra.csv", b"x")]);

        let merged = merge_archives(&[first.clone(), second.clone()], &dir, 777).unwrap();
        assert_eq!(merged, dir.join("777-merged.zip"));

        let mut archive = ZipArchive::new(BufReader::new(File::open(&merged).unwrap())).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "Месяц-Новинки/extra.csv".to_string(),
                "Месяц-Новинки/report.xlsx".to_string(),
                "Неделя-Все/report.xlsx".to_string(),
            ]
        );

        // source archives are cleaned up after a merge
        assert!(!first.exists());
        assert!(!second.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn merge_skips_unreadable_sources() {
        let dir = temp_dir("merge-bad");
        let good = dir.join("9-Неделя-Все.zip");
        let bad = dir.join("9-corrupt.zip");
        write_zip(&good, &[("report.xlsx", b"data")]);
        std::fs::write(&bad, b"this is not a zip").unwrap();

        let merged = merge_archives(&[bad, good], &dir, 9).unwrap();
        let mut archive = ZipArchive::new(BufReader::new(File::open(&merged).unwrap())).unwrap();
        assert_eq!(archive.len(), 1);
        assert_eq!(archive.by_index(0).unwrap().name(), "Неделя-Все/report.xlsx");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn wait_for_download_picks_up_new_stable_file() {
        let dir = temp_dir("downloads");
        std::fs::write(dir.join("fresh.zip"), b"zip bytes").unwrap();

        let found = wait_for_download(&dir, &HashSet::new(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(found, dir.join("fresh.zip"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn wait_for_download_ignores_preexisting_and_partial_files() {
        let dir = temp_dir("downloads-partial");
        let old = dir.join("old.zip");
        std::fs::write(&old, b"already there").unwrap();
        std::fs::write(dir.join("busy.zip"), b"half").unwrap();
        std::fs::write(dir.join("busy.zip.part"), b"").unwrap();

        let before = HashSet::from([old]);
        let result = wait_for_download(&dir, &before, Duration::from_millis(1200)).await;
        assert!(matches!(result, Err(ScrapeError::WaitTimeout { .. })));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
