//! Built-in connector catalogue
//!
//! One entry per [`DatasetSource`]. Default endpoints can be overridden per
//! source through [`DatasetConfig`]. Sources without a public feed emit a
//! notice document, unless a download URL has been configured for them, in
//! which case the configured file is ingested as-is.

use std::sync::Arc;

use reqwest::header::HeaderName;
use reqwest::Client;
use serde_json::{json, Value};

use super::config::DatasetConfig;
use super::connector::{
    ApiKey, ArchiveRecordsConfig, ArchiveRecordsConnector, BulkFileConfig, BulkFileConnector,
    DatasetConnector, PageParser, PagedApiConfig, PagedApiConnector, Pagination, StaticConnector,
};
use super::sources::DatasetSource;

const OPENFDA_API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");

// ============================================================================
// Page parsers
// ============================================================================

fn array_at(body: &Value, pointer: &str) -> Vec<Value> {
    body.pointer(pointer)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Numeric field that may arrive as a number or a numeric string. Missing
/// fields read as zero; anything else is NaN and fails every comparison.
fn number_at(body: &Value, pointer: &str) -> f64 {
    match body.pointer(pointer) {
        None | Some(Value::Null) => 0.0,
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(f64::NAN),
        Some(_) => f64::NAN,
    }
}

/// Items are the array under a fixed pointer; stops on the first empty page
struct FieldParser(&'static str);

impl PageParser for FieldParser {
    fn parse_items(&self, body: &Value) -> Vec<Value> {
        array_at(body, self.0)
    }
}

struct DailyMedParser;

impl PageParser for DailyMedParser {
    fn parse_items(&self, body: &Value) -> Vec<Value> {
        array_at(body, "/data/drug")
            .iter()
            .map(|drug| {
                json!({
                    "name": drug.get("drug_name"),
                    "setId": drug.get("setid"),
                    "updated": drug.get("last_updated"),
                })
            })
            .collect()
    }

    fn has_more(&self, body: &Value, _items: &[Value]) -> bool {
        let total = body.pointer("/metadata/total_pages").and_then(Value::as_f64);
        let current = body.pointer("/metadata/current_page").and_then(Value::as_f64);
        match (current, total) {
            (Some(current), Some(total)) => current < total,
            _ => false,
        }
    }
}

struct ClinicalTrialsParser;

impl PageParser for ClinicalTrialsParser {
    fn parse_items(&self, body: &Value) -> Vec<Value> {
        array_at(body, "/FullStudiesResponse/FullStudies")
            .iter()
            .map(|study| {
                let protocol = study.pointer("/Study/ProtocolSection");
                let field = |pointer: &str| protocol.and_then(|p| p.pointer(pointer)).cloned();
                let title = field("/IdentificationModule/OfficialTitle")
                    .filter(|v| !v.is_null())
                    .or_else(|| field("/IdentificationModule/BriefTitle"));

                json!({
                    "nctId": field("/IdentificationModule/NCTId"),
                    "title": title,
                    "status": field("/StatusModule/OverallStatus"),
                    "conditions": field("/ConditionsModule/ConditionList/Condition")
                        .filter(|v| !v.is_null())
                        .unwrap_or_else(|| json!([])),
                })
            })
            .collect()
    }

    fn has_more(&self, body: &Value, _items: &[Value]) -> bool {
        let found = number_at(body, "/FullStudiesResponse/NStudiesFound");
        let returned = number_at(body, "/FullStudiesResponse/NStudiesReturned");
        let min_rank = number_at(body, "/FullStudiesResponse/MinRank");
        min_rank + returned <= found
    }
}

/// openFDA style `meta.results.{skip,limit,total}` envelope
struct OpenFdaParser;

impl PageParser for OpenFdaParser {
    fn parse_items(&self, body: &Value) -> Vec<Value> {
        array_at(body, "/results")
    }

    fn has_more(&self, body: &Value, _items: &[Value]) -> bool {
        let total = number_at(body, "/meta/results/total");
        let skip = number_at(body, "/meta/results/skip");
        let limit = number_at(body, "/meta/results/limit");
        skip + limit < total
    }
}

struct MedlinePlusParser;

impl PageParser for MedlinePlusParser {
    fn parse_items(&self, body: &Value) -> Vec<Value> {
        match body.pointer("/list/record") {
            Some(Value::Array(records)) => records.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(record) => vec![record.clone()],
        }
    }
}

struct UspstfParser;

impl PageParser for UspstfParser {
    fn parse_items(&self, body: &Value) -> Vec<Value> {
        array_at(body, "/data")
    }

    fn has_more(&self, body: &Value, _items: &[Value]) -> bool {
        let page = body.pointer("/pagination/page").and_then(Value::as_f64);
        let total = body.pointer("/pagination/totalPages").and_then(Value::as_f64);
        match (page, total) {
            (Some(page), Some(total)) => page < total,
            _ => false,
        }
    }
}

// ============================================================================
// Catalogue
// ============================================================================

fn notice(source: DatasetSource) -> Option<&'static str> {
    use DatasetSource::*;

    let message = match source {
        StatPearls => "StatPearls content requires institutional access. Provide API credentials via DATASET_STATPEARLS_BASE_URL to enable ingestion.",
        DataIngestion => "Internal ingestion orchestrations are handled via this module. Trigger POST /api/datasets/:source/ingest to capture new snapshots.",
        FireScrapeTool => "FireScrape tool results are streamed separately. Provide DATASET_FIRESCRAPETOOL_DOWNLOAD_URL to persist crawled artifacts.",
        Seer => "SEER data requires subscription. Upload exports to object storage and set DATASET_SEER_DOWNLOAD_URL to ingest.",
        InternationalRegistries => "International registry ingestion requires custom connectors. Configure DATASET_INTERNATIONALREGISTRIES_DOWNLOAD_URL to supply curated exports.",
        CheXpertSplits => "CheXpert splits are distributed under research agreements. Upload JSON manifests to storage and configure DATASET_CHEXPERTSPLITS_DOWNLOAD_URL.",
        MimicSplits => "MIMIC derived splits require protected data access. Provide secure download URL via DATASET_MIMICSPLITS_DOWNLOAD_URL.",
        RidCovid => "RID-COVID artifacts are hosted externally. Configure DATASET_RIDCOVID_DOWNLOAD_URL to enable ingestion.",
        RjuaQa => "RJUA-QA dataset ingestion expects pre-signed URLs provided through DATASET_RJUAQA_DOWNLOAD_URL.",
        DdxPlus => "DDXPlus dataset requires approval. Supply dataset artifact via DATASET_DDXPLUS_DOWNLOAD_URL.",
        Luna16 => "LUNA16 dataset ingestion expects manual upload. Point DATASET_LUNA16_DOWNLOAD_URL to a prepared archive.",
        MimicIv => "MIMIC-IV is restricted. Configure DATASET_MIMIC_IV_DOWNLOAD_URL for approved exports.",
        EicuCrd => "eICU-CRD requires credentialed access. Configure DATASET_EICU_CRD_DOWNLOAD_URL to ingest snapshots.",
        _ => return None,
    };
    Some(message)
}

fn paged(
    source: DatasetSource,
    client: Client,
    config: PagedApiConfig,
    parser: impl PageParser + 'static,
) -> Arc<dyn DatasetConnector> {
    Arc::new(PagedApiConnector::new(source, client, config, parser))
}

fn bulk(source: DatasetSource, client: Client, url: String) -> Arc<dyn DatasetConnector> {
    Arc::new(BulkFileConnector::new(source, client, BulkFileConfig::new(url)))
}

/// Build the connector for `source` with the configured endpoints
pub fn builtin_connector(
    source: DatasetSource,
    config: &DatasetConfig,
    client: Client,
) -> Arc<dyn DatasetConnector> {
    use DatasetSource::*;

    let base = |fallback: &str| config.base_url(source, fallback);

    match source {
        DailyMed => paged(
            source,
            client,
            PagedApiConfig::new(
                base("https://dailymed.nlm.nih.gov/dailymed/services/v2/"),
                "drugnames.json",
                Pagination::page("page"),
            )
            .page_size("pagesize", 100),
            DailyMedParser,
        ),
        ClinicalTrials => paged(
            source,
            client,
            PagedApiConfig::new(
                base("https://clinicaltrials.gov/api/"),
                "query/full_studies",
                Pagination::page("page"),
            )
            .page_size("pageSize", 50)
            .static_param("expr", "AREA[LocationCountry]\"United States\""),
            ClinicalTrialsParser,
        ),
        OrangeBook => Arc::new(ArchiveRecordsConnector::new(
            source,
            client,
            ArchiveRecordsConfig::new(config.download_url(
                source,
                "https://download.fda.gov/drugsatfda_docs/OrangeBook/zip/Products.zip",
            ))
            .delimiter("\t"),
        )),
        OpenFda => paged(
            source,
            client,
            PagedApiConfig::new(
                base("https://api.fda.gov/"),
                "drug/event.json",
                Pagination::offset("skip"),
            )
            .page_size("limit", 100)
            .api_key(ApiKey::from_config(OPENFDA_API_KEY_HEADER, config.api_key(source))),
            OpenFdaParser,
        ),
        Faers => paged(
            source,
            client,
            PagedApiConfig::new(
                base("https://api.fda.gov/"),
                "drug/event.json",
                Pagination::offset("skip"),
            )
            .page_size("limit", 100),
            OpenFdaParser,
        ),
        NihSafety => paged(
            source,
            client,
            PagedApiConfig::new(
                base("https://api.fda.gov/"),
                "drug/label.json",
                Pagination::offset("skip"),
            )
            .page_size("limit", 100),
            OpenFdaParser,
        ),
        CmsPuf => bulk(
            source,
            client,
            config.download_url(source, "https://download.cms.gov/data/public-use-files.zip"),
        ),
        Nppes => bulk(
            source,
            client,
            config.download_url(source, "https://download.cms.gov/nppes/NPI_Files.html"),
        ),
        Synthea => bulk(
            source,
            client,
            config.download_url(
                source,
                "https://synthetichealth.github.io/synthea-sample-data/downloads/synthea_sample_data_fhir_102.zip",
            ),
        ),
        MedlinePlus => paged(
            source,
            client,
            PagedApiConfig::new(
                base("https://wsearch.nlm.nih.gov/ws/"),
                "search",
                Pagination::page("page"),
            )
            .page_size("max", 100)
            .static_param("db", "healthTopics")
            .static_param("term", "cancer"),
            MedlinePlusParser,
        ),
        PubMedCentral => paged(
            source,
            client,
            PagedApiConfig::new(
                base("https://eutils.ncbi.nlm.nih.gov/entrez/eutils/"),
                "esearch.fcgi",
                Pagination::offset("retstart"),
            )
            .page_size("retmax", 100)
            .static_param("db", "pmc")
            .static_param("term", "cancer")
            .static_param("retmode", "json"),
            FieldParser("/esearchresult/idlist"),
        ),
        Uspstf => paged(
            source,
            client,
            PagedApiConfig::new(
                base("https://www.uspreventiveservicestaskforce.org/"),
                "api/recommendations",
                Pagination::page("page"),
            )
            .page_size("pageSize", 50),
            UspstfParser,
        ),
        CdcGuidelines => paged(
            source,
            client,
            PagedApiConfig::new(
                base("https://www.cdc.gov/"),
                "api/v2/resources",
                Pagination::page("page"),
            )
            .page_size("pageSize", 100),
            FieldParser("/results"),
        ),
        Nhanes => paged(
            source,
            client,
            PagedApiConfig::new(
                base("https://healthdata.gov/api/"),
                "views/7pwj-59pg/rows.json",
                Pagination::page("page"),
            )
            .page_size("pageSize", 100),
            FieldParser("/data"),
        ),
        StatPearls | DataIngestion | FireScrapeTool | Seer | InternationalRegistries
        | CheXpertSplits | MimicSplits | RidCovid | RjuaQa | DdxPlus | Luna16 | MimicIv
        | EicuCrd => match config.download_override(source) {
            Some(url) => bulk(source, client, url.to_string()),
            None => Arc::new(StaticConnector::notice(
                source,
                notice(source).unwrap_or("No public feed is available for this source."),
            )),
        },
    }
}
