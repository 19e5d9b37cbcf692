//! The toolkit's subcommands. Each one wraps the same authenticated client
//! in a few lines of sequential I/O.

use crate::segments::SegmentTally;
use anyhow::{Context, bail};
use strava_client::cache::{CACHE_FOLDER, ResponseCache};
use strava_client::http_client::{ApiAccess, RESPONSES_PER_PAGE};
use strava_client::paths::PathCatalog;
use strava_client::query::QueryDatabase;
use strava_client::{ActivitySummary, DetailedActivity, StravaApi, StravaError};

const METERS_TO_MILES: f64 = 0.000_621_371;

/// Where `activities` dumps the full list once it has paid the cost of
/// fetching everything.
const ACTIVITIES_DUMP: &str = "activities.json";

/// Print the athlete profile as pretty JSON.
pub async fn run_athlete(api: &ApiAccess) -> anyhow::Result<()> {
    let athlete = api.get_json("/athlete", &[]).await?;
    println!("{}", serde_json::to_string_pretty(&athlete)?);
    Ok(())
}

pub fn format_activity_line(activity: &ActivitySummary) -> String {
    format!(
        "{} ({}): {:.3}mi {}\u{1F44D}",
        activity.name,
        activity.sport_type.as_deref().unwrap_or("unknown"),
        activity.distance * METERS_TO_MILES,
        activity.kudos_count
    )
}

/// Page through every activity, printing one line each, then dump the whole
/// list to disk so reruns do not have to wait on the API again.
pub async fn run_activities(api: &ApiAccess) -> anyhow::Result<()> {
    let all = fetch_all_activities(api, |page| {
        for activity in page {
            println!("{}", format_activity_line(activity));
        }
    })
    .await?;
    println!("Found all {} activities!", all.len());

    std::fs::write(ACTIVITIES_DUMP, serde_json::to_string_pretty(&all)?)
        .with_context(|| format!("writing {ACTIVITIES_DUMP}"))?;
    Ok(())
}

async fn fetch_all_activities(
    api: &ApiAccess,
    mut on_page: impl FnMut(&[ActivitySummary]),
) -> anyhow::Result<Vec<ActivitySummary>> {
    let mut all = Vec::new();
    let mut page = 1u32;
    loop {
        let batch = api.get_activities_page(page, RESPONSES_PER_PAGE).await?;
        if batch.is_empty() {
            return Ok(all);
        }
        on_page(&batch);
        all.extend(batch);
        page += 1;
    }
}

/// Tally which segments show up most often across every activity and print
/// the top 20. One detailed-activity request per activity, so this runs
/// into API rate limits on large histories; every response goes through
/// the on-disk cache, so a rerun picks up where the last one stopped.
/// Ctrl-C prints what was collected so far.
pub async fn run_segments(api: ApiAccess) -> anyhow::Result<()> {
    let cache = ResponseCache::new(CACHE_FOLDER);
    let catalog = PathCatalog::fetch(&cache, false)
        .await
        .context("fetching the API definition")?;
    let db = QueryDatabase::new(api, catalog, cache);

    let tally = tally_segments(&db).await?;
    for usage in tally.ranked().into_iter().take(20) {
        println!("{usage}");
    }
    Ok(())
}

async fn tally_segments<C: StravaApi>(db: &QueryDatabase<C>) -> anyhow::Result<SegmentTally> {
    let activities: Vec<ActivitySummary> =
        serde_json::from_value(db.query("/athlete/activities", &[], false).await?)
            .context("decoding the activity list")?;
    tracing::info!("tallying segments across {} activities", activities.len());

    let params = [("include_all_efforts".to_string(), "true".to_string())];
    let mut tally = SegmentTally::new();
    for activity in &activities {
        let path = format!("/activities/{}", activity.id);
        let detailed = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!(
                    "interrupted after {} of {} activities; printing what was collected",
                    tally.activities_seen(),
                    activities.len()
                );
                break;
            }
            res = db.query(&path, &params, false) => res,
        };
        let detailed: DetailedActivity = match detailed {
            Ok(value) => serde_json::from_value(value).context("decoding a detailed activity")?,
            Err(StravaError::RateLimited(msg)) => {
                bail!(
                    "rate limited after {} activities ({msg}); \
                     the responses so far are cached, rerun later to continue",
                    tally.activities_seen()
                );
            }
            Err(e) => return Err(e.into()),
        };
        for effort in &detailed.segment_efforts {
            tally.record(&effort.segment);
        }
        tally.finish_activity();
    }
    Ok(tally)
}

pub struct QueryArgs {
    pub path: String,
    pub params: Vec<(String, String)>,
    pub force_refresh: bool,
}

impl QueryArgs {
    pub fn parse(args: &[String]) -> anyhow::Result<Self> {
        let mut path = None;
        let mut params = Vec::new();
        let mut force_refresh = false;
        for arg in args {
            if arg == "--force-refresh" {
                force_refresh = true;
            } else if let Some(flag) = arg.strip_prefix("--") {
                bail!("unknown flag --{flag}");
            } else if let Some((k, v)) = arg.split_once('=') {
                params.push((k.to_string(), v.to_string()));
            } else if path.is_none() {
                path = Some(arg.clone());
            } else {
                bail!("unexpected argument {arg:?}");
            }
        }
        let Some(path) = path else {
            bail!("query needs an API path, e.g. strava query /athlete/activities");
        };
        if !path.starts_with('/') {
            bail!("API paths start with '/', got {path:?}");
        }
        Ok(Self {
            path,
            params,
            force_refresh,
        })
    }
}

/// Validated, cached, paginated GET of an arbitrary path.
pub async fn run_query(api: ApiAccess, args: QueryArgs) -> anyhow::Result<()> {
    let cache = ResponseCache::new(CACHE_FOLDER);
    let catalog = PathCatalog::fetch(&cache, false)
        .await
        .context("fetching the API definition")?;
    let db = QueryDatabase::new(api, catalog, cache);

    let result = db.query(&args.path, &args.params, args.force_refresh).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
