use std::sync::Arc;
use std::time::Duration;

use bojo::classifier::{
    ClassificationError, ExtractedInfo, GeminiAnalysisResult, StaticClassifier, normalize_date,
};
use bojo::extractor::{Extractor, ExtractorConfig};
use bojo::fetcher::{FetchMode, StaticFetcher};
use bojo::models::{AnnouncementStatus, CrawlLogStatus, RegionSource, RegionType, RunStatus};
use bojo::orchestrator::{Orchestrator, OrchestratorConfig, RunOptions};
use bojo::query::{RunResultsQuery, run_announcements};
use bojo::store::{Database, OperatorUpdate};

const LISTING_URL: &str = "http://city.go.kr/board/list.do";

fn detail_url(n: u32) -> String {
    format!("http://city.go.kr/board/view.do?nttId={}", n)
}

fn announcement_page(title: &str, extra: &str) -> String {
    format!(
        r#"<html><head><title>{title} | 시청</title></head><body>
        <div id="gnb">전체메뉴 로그인 회원가입 사이트맵</div>
        <div class="board_view">
          <h3>{title}</h3>
          <p>관내 농업인의 농기계 구입비를 보조하는 지원사업을 다음과 같이 공고합니다.
          지원대상은 관내 거주 농업인이며 신청기간은 2025.03.01 ~ 2025.03.31 입니다.
          총 사업비 예산은 5억원이며 보조금은 구입가격의 50% 이내입니다. 자부담 50%. {extra}</p>
        </div>
        <div class="footer">개인정보처리방침 저작권</div>
        </body></html>"#
    )
}

fn listing_page() -> String {
    let rows: String = (1..=3)
        .map(|n| {
            format!(
                r#"<tr><td>{n}</td><td><a href="/board/view.do?nttId={n}">2025년 지원사업 공고 {n}</a></td></tr>"#
            )
        })
        .collect();
    format!(
        r#"<html><body><h2>공지사항</h2><table class="board_list"><tbody>{rows}</tbody></table></body></html>"#
    )
}

fn region(code: &str, url: &str) -> RegionSource {
    RegionSource {
        region_code: code.to_string(),
        region_name: format!("지역{}", code),
        region_type: RegionType::Basic,
        url: url.to_string(),
        is_active: true,
        is_listing: false,
    }
}

fn orchestrator(
    db: &Database,
    regions: Vec<RegionSource>,
    fetcher: Arc<StaticFetcher>,
    classifier: Arc<StaticClassifier>,
) -> Orchestrator {
    let config = OrchestratorConfig::builder()
        .batch_size(2)
        .region_timeout(Duration::from_secs(10))
        .fetch_retries(1, Duration::from_millis(1))
        .fetch_mode(FetchMode::Http)
        .build();
    Orchestrator::new(
        db.clone(),
        Arc::new(regions),
        fetcher,
        Arc::new(Extractor::new(&ExtractorConfig::default()).unwrap()),
        classifier,
        config,
    )
}

fn relevant(score: f64) -> GeminiAnalysisResult {
    GeminiAnalysisResult {
        keywords_matched: vec!["농기계".to_string()],
        extracted_info: ExtractedInfo {
            application_period_start: Some("2025.03.01".to_string()),
            application_period_end: Some("2025년 3월 31일".to_string()),
            ..Default::default()
        },
        ..GeminiAnalysisResult::scored(true, score)
    }
}

#[tokio::test]
async fn recrawl_is_idempotent() {
    let db = Database::new_in_memory().await.unwrap();
    let url = "http://gun.go.kr/notice/1";
    let fetcher = Arc::new(StaticFetcher::new().with_page(url, announcement_page("농기계 지원", "")));
    let classifier = Arc::new(StaticClassifier::new(relevant(0.9)));
    let orch = orchestrator(&db, vec![region("11", url)], fetcher, classifier.clone());

    let first = orch.run(RunOptions::default(), None).await.unwrap();
    assert_eq!(first.status, RunStatus::Success);
    assert_eq!(first.new_announcement_count, 1);

    let second = orch.run(RunOptions::default(), None).await.unwrap();
    assert_eq!(second.status, RunStatus::Success);
    assert_eq!(second.new_announcement_count, 0);
    // Unchanged content is not sent to the classifier again
    assert_eq!(classifier.calls(), 1);

    let page = run_announcements(&db, &second.run_id, &RunResultsQuery::default())
        .await
        .unwrap();
    assert_eq!(page.pagination.total, 1);
    let announcement = &page.announcements[0];
    assert_eq!(announcement.crawl_run_id, second.run_id);
    assert_eq!(announcement.application_period_start.as_deref(), Some("2025-03-01"));
    assert_eq!(announcement.application_period_end.as_deref(), Some("2025-03-31"));

    // Forced runs reclassify but still do not count the row as new
    let forced = orch
        .run(
            RunOptions {
                force: Some(true),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(forced.new_announcement_count, 0);
    assert_eq!(classifier.calls(), 2);
}

#[tokio::test]
async fn operator_fields_survive_recrawl() {
    let db = Database::new_in_memory().await.unwrap();
    let url = "http://gun.go.kr/notice/7";
    let classifier = Arc::new(StaticClassifier::new(relevant(0.9)));

    let before = Arc::new(StaticFetcher::new().with_page(url, announcement_page("1차 공고", "")));
    let run = orchestrator(&db, vec![region("11", url)], before, classifier.clone())
        .run(RunOptions::default(), None)
        .await
        .unwrap();
    let page = run_announcements(&db, &run.run_id, &RunResultsQuery::default())
        .await
        .unwrap();
    let id = page.announcements[0].id;

    let update = OperatorUpdate {
        status: Some(AnnouncementStatus::Applied),
        is_read: Some(true),
        notes: Some("서류 제출 완료".to_string()),
    };
    assert!(db.update_operator_fields(id, &update).await.unwrap());

    let after = Arc::new(
        StaticFetcher::new().with_page(url, announcement_page("1차 공고", "신청방법은 방문 접수입니다.")),
    );
    orchestrator(&db, vec![region("11", url)], after, classifier)
        .run(RunOptions::default(), None)
        .await
        .unwrap();

    let announcement = db.get_announcement(id).await.unwrap().unwrap();
    assert_eq!(announcement.status, AnnouncementStatus::Applied);
    assert!(announcement.is_read);
    assert_eq!(announcement.notes.as_deref(), Some("서류 제출 완료"));
    assert!(announcement.content.contains("방문 접수"));
}

#[tokio::test]
async fn failing_region_is_isolated() {
    let db = Database::new_in_memory().await.unwrap();
    let urls = ["http://a.go.kr/n/1", "http://b.go.kr/n/1", "http://c.go.kr/n/1"];
    let fetcher = Arc::new(
        StaticFetcher::new()
            .with_page(urls[0], announcement_page("A 공고", ""))
            .with_timeout(urls[1])
            .with_page(urls[2], announcement_page("C 공고", "")),
    );
    let regions = vec![region("A", urls[0]), region("B", urls[1]), region("C", urls[2])];
    let classifier = Arc::new(StaticClassifier::new(relevant(0.9)));

    let run = orchestrator(&db, regions, fetcher.clone(), classifier)
        .run(RunOptions::default(), None)
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Partial);
    assert_eq!(run.regions_succeeded, 2);
    assert_eq!(run.regions_failed, 1);
    assert_eq!(run.new_announcement_count, 2);
    // One retry before giving up
    assert_eq!(fetcher.calls(urls[1]), 2);

    let logs = db.logs_for_run(&run.run_id).await.unwrap();
    assert_eq!(logs.len(), 3);
    let failed: Vec<_> = logs
        .iter()
        .filter(|l| l.status == CrawlLogStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].region_code.as_deref(), Some("B"));
    assert!(failed[0].error_message.is_some());
}

#[tokio::test]
async fn listing_with_one_timed_out_detail() {
    let db = Database::new_in_memory().await.unwrap();
    let fetcher = Arc::new(
        StaticFetcher::new()
            .with_page(LISTING_URL, listing_page())
            .with_page(&detail_url(1), announcement_page("공고 1", ""))
            .with_timeout(&detail_url(2))
            .with_page(&detail_url(3), announcement_page("공고 3", "")),
    );
    let classifier = Arc::new(StaticClassifier::new(relevant(0.9)));

    let run = orchestrator(&db, vec![region("44", LISTING_URL)], fetcher, classifier)
        .run(RunOptions::default(), None)
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.new_announcement_count, 2);

    let logs = db.logs_for_run(&run.run_id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, CrawlLogStatus::Partial);
    assert_eq!(logs[0].announcements_found, 2);

    let page = run_announcements(&db, &run.run_id, &RunResultsQuery::default())
        .await
        .unwrap();
    let mut urls: Vec<_> = page.announcements.iter().map(|a| a.source_url.clone()).collect();
    urls.sort();
    assert_eq!(urls, vec![detail_url(1), detail_url(3)]);
    assert!(page.announcements.iter().any(|a| a.title == "공고 1"));
}

#[tokio::test]
async fn listing_without_phase_two_is_classified_itself() {
    let db = Database::new_in_memory().await.unwrap();
    let fetcher = Arc::new(StaticFetcher::new().with_page(LISTING_URL, listing_page()));
    let classifier = Arc::new(StaticClassifier::new(GeminiAnalysisResult::scored(false, 0.2)));

    let run = orchestrator(&db, vec![region("44", LISTING_URL)], fetcher.clone(), classifier)
        .run(
            RunOptions {
                follow_details: Some(false),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(run.new_announcement_count, 1);
    assert_eq!(fetcher.calls(&detail_url(1)), 0);
}

#[tokio::test]
async fn ai_verified_filter_uses_threshold() {
    let db = Database::new_in_memory().await.unwrap();
    let fetcher = Arc::new(
        StaticFetcher::new()
            .with_page(LISTING_URL, listing_page())
            .with_page(&detail_url(1), announcement_page("공고 1", ""))
            .with_page(&detail_url(2), announcement_page("공고 2", ""))
            .with_page(&detail_url(3), announcement_page("공고 3", "")),
    );
    let classifier = Arc::new(
        StaticClassifier::new(GeminiAnalysisResult::scored(false, 0.1))
            .with_result(&detail_url(1), relevant(0.82))
            .with_result(&detail_url(2), relevant(0.5)),
    );

    let run = orchestrator(&db, vec![region("44", LISTING_URL)], fetcher, classifier)
        .run(RunOptions::default(), None)
        .await
        .unwrap();

    let verified = RunResultsQuery {
        ai_verified_only: true,
        ..Default::default()
    };
    let page = run_announcements(&db, &run.run_id, &verified).await.unwrap();
    assert_eq!(page.pagination.total, 1);
    assert_eq!(page.announcements[0].source_url, detail_url(1));
    assert_eq!(page.announcements[0].relevance_score, Some(0.82));

    let relevant_only = RunResultsQuery {
        relevant_only: true,
        ..Default::default()
    };
    let page = run_announcements(&db, &run.run_id, &relevant_only).await.unwrap();
    assert_eq!(page.pagination.total, 2);
}

#[tokio::test]
async fn classification_failure_is_persisted_and_retried() {
    let db = Database::new_in_memory().await.unwrap();
    let url = "http://gun.go.kr/notice/3";
    let fetcher = Arc::new(StaticFetcher::new().with_page(url, announcement_page("공고", "")));
    let broken = Arc::new(
        StaticClassifier::new(relevant(0.9))
            .with_error(url, ClassificationError::Quota { retry_after_secs: None }),
    );

    let run = orchestrator(&db, vec![region("11", url)], fetcher.clone(), broken)
        .run(RunOptions::default(), None)
        .await
        .unwrap();
    assert_eq!(run.new_announcement_count, 1);

    let page = run_announcements(&db, &run.run_id, &RunResultsQuery::default())
        .await
        .unwrap();
    let stored = &page.announcements[0];
    assert!(stored.needs_reclassification);
    assert!(!stored.is_relevant);
    assert!(stored.relevance_score.is_none());
    assert!(stored.application_period_end.is_none());

    let healthy = Arc::new(StaticClassifier::new(relevant(0.9)));
    let summary = orchestrator(&db, vec![region("11", url)], fetcher, healthy)
        .reclassify_pending(10, 2)
        .await
        .unwrap();
    assert_eq!(summary.succeeded, 1);

    let fixed = db.get_announcement(stored.id).await.unwrap().unwrap();
    assert!(!fixed.needs_reclassification);
    assert!(fixed.is_relevant);
    assert_eq!(fixed.application_period_end.as_deref(), Some("2025-03-31"));
}

#[test]
fn dates_normalize_or_null() {
    assert_eq!(normalize_date("2025.03.01").as_deref(), Some("2025-03-01"));
    assert_eq!(normalize_date("2025년 3월 1일").as_deref(), Some("2025-03-01"));
    assert_eq!(normalize_date("상시"), None);
    assert_eq!(normalize_date("예산 소진 시까지"), None);
    assert_eq!(normalize_date("2025.02.30"), None);
}

#[test]
fn unmatched_page_falls_back_with_low_confidence() {
    let extractor = Extractor::new(&ExtractorConfig::default()).unwrap();
    let html = "<html><body><div><span>Hello from an unfamiliar template</span></div></body></html>";
    let content = extractor.extract(html);
    assert!(!content.text.trim().is_empty());
    assert!(content.confidence < extractor.threshold());
    assert!(content.is_low_trust());
}

#[tokio::test]
async fn watchdog_keeps_tallies_of_persisted_details() {
    let db = Database::new_in_memory().await.unwrap();
    let fetcher = Arc::new(
        StaticFetcher::new()
            .with_page(LISTING_URL, listing_page())
            .with_page(&detail_url(1), announcement_page("공고 1", ""))
            .with_page(&detail_url(2), announcement_page("공고 2", ""))
            .with_page(&detail_url(3), announcement_page("공고 3", ""))
            .with_delay(&detail_url(3), Duration::from_secs(5)),
    );
    let classifier = Arc::new(StaticClassifier::new(relevant(0.9)));
    let config = OrchestratorConfig::builder()
        .region_timeout(Duration::from_millis(800))
        .fetch_retries(0, Duration::from_millis(1))
        .fetch_mode(FetchMode::Http)
        .build();
    let orchestrator = Orchestrator::new(
        db.clone(),
        Arc::new(vec![region("44", LISTING_URL)]),
        fetcher,
        Arc::new(Extractor::new(&ExtractorConfig::default()).unwrap()),
        classifier,
        config,
    );

    let run = orchestrator.run(RunOptions::default(), None).await.unwrap();
    assert_eq!(run.new_announcement_count, 2);
    assert_eq!(run.regions_succeeded, 1);
    assert_eq!(run.status, RunStatus::Success);

    let logs = db.logs_for_run(&run.run_id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, CrawlLogStatus::Partial);
    assert_eq!(logs[0].announcements_found, 2);
    assert_eq!(logs[0].relevant_found, 2);
    assert!(
        logs[0]
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("timed out"))
    );
}

#[tokio::test]
async fn unmatched_template_reaches_classifier_as_low_trust() {
    let db = Database::new_in_memory().await.unwrap();
    let plain = "http://myeon.go.kr/news/12";
    let templated = "http://gun.go.kr/notice/4";
    let plain_html = format!(
        "<html><body><span>{}</span></body></html>",
        "농기계 구입 안내입니다. 자세한 내용은 담당부서로 문의하세요. ".repeat(4)
    );
    let fetcher = Arc::new(
        StaticFetcher::new()
            .with_page(plain, plain_html)
            .with_page(templated, announcement_page("공고", "")),
    );
    let classifier = Arc::new(StaticClassifier::new(relevant(0.9)));

    orchestrator(
        &db,
        vec![region("21", plain), region("22", templated)],
        fetcher,
        classifier.clone(),
    )
    .run(RunOptions::default(), None)
    .await
    .unwrap();

    assert_eq!(classifier.low_trust_for(plain), Some(true));
    assert_eq!(classifier.low_trust_for(templated), Some(false));
}
