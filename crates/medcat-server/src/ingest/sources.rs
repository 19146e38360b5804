//! The closed set of dataset sources
//!
//! Display names are the stable identifiers stored in the ledger and accepted
//! by the HTTP and CLI surfaces. Resolution is case-insensitive.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DatasetSource {
    #[serde(rename = "Data Ingestion")]
    DataIngestion,
    #[serde(rename = "FireScrape Tool")]
    FireScrapeTool,
    #[serde(rename = "DailyMed")]
    DailyMed,
    #[serde(rename = "Orange Book")]
    OrangeBook,
    #[serde(rename = "CDC/NIH Guidelines")]
    CdcGuidelines,
    #[serde(rename = "NIH Drug-Safety")]
    NihSafety,
    #[serde(rename = "StatPearls")]
    StatPearls,
    #[serde(rename = "USPSTF Recommendations")]
    Uspstf,
    #[serde(rename = "ClinicalTrials.gov")]
    ClinicalTrials,
    #[serde(rename = "MedlinePlus")]
    MedlinePlus,
    #[serde(rename = "MIMIC-IV")]
    MimicIv,
    #[serde(rename = "eICU-CRD")]
    EicuCrd,
    #[serde(rename = "FAERS")]
    Faers,
    #[serde(rename = "CMS Public Use Files")]
    CmsPuf,
    #[serde(rename = "OpenFDA")]
    OpenFda,
    #[serde(rename = "SEER Program")]
    Seer,
    #[serde(rename = "NHANES")]
    Nhanes,
    #[serde(rename = "NPPES")]
    Nppes,
    #[serde(rename = "PubMed Central")]
    PubMedCentral,
    #[serde(rename = "Synthea")]
    Synthea,
    #[serde(rename = "International Registries")]
    InternationalRegistries,
    #[serde(rename = "SyntheticallyEnhanced: CheXpert")]
    CheXpertSplits,
    #[serde(rename = "SyntheticallyEnhanced: MIMIC")]
    MimicSplits,
    #[serde(rename = "RID-COVID")]
    RidCovid,
    #[serde(rename = "RJUA-QA")]
    RjuaQa,
    #[serde(rename = "DDXPlus Dataset")]
    DdxPlus,
    #[serde(rename = "LUNA16")]
    Luna16,
}

impl DatasetSource {
    pub const ALL: [DatasetSource; 27] = [
        DatasetSource::DataIngestion,
        DatasetSource::FireScrapeTool,
        DatasetSource::DailyMed,
        DatasetSource::OrangeBook,
        DatasetSource::CdcGuidelines,
        DatasetSource::NihSafety,
        DatasetSource::StatPearls,
        DatasetSource::Uspstf,
        DatasetSource::ClinicalTrials,
        DatasetSource::MedlinePlus,
        DatasetSource::MimicIv,
        DatasetSource::EicuCrd,
        DatasetSource::Faers,
        DatasetSource::CmsPuf,
        DatasetSource::OpenFda,
        DatasetSource::Seer,
        DatasetSource::Nhanes,
        DatasetSource::Nppes,
        DatasetSource::PubMedCentral,
        DatasetSource::Synthea,
        DatasetSource::InternationalRegistries,
        DatasetSource::CheXpertSplits,
        DatasetSource::MimicSplits,
        DatasetSource::RidCovid,
        DatasetSource::RjuaQa,
        DatasetSource::DdxPlus,
        DatasetSource::Luna16,
    ];

    /// Display name, also the ledger key
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetSource::DataIngestion => "Data Ingestion",
            DatasetSource::FireScrapeTool => "FireScrape Tool",
            DatasetSource::DailyMed => "DailyMed",
            DatasetSource::OrangeBook => "Orange Book",
            DatasetSource::CdcGuidelines => "CDC/NIH Guidelines",
            DatasetSource::NihSafety => "NIH Drug-Safety",
            DatasetSource::StatPearls => "StatPearls",
            DatasetSource::Uspstf => "USPSTF Recommendations",
            DatasetSource::ClinicalTrials => "ClinicalTrials.gov",
            DatasetSource::MedlinePlus => "MedlinePlus",
            DatasetSource::MimicIv => "MIMIC-IV",
            DatasetSource::EicuCrd => "eICU-CRD",
            DatasetSource::Faers => "FAERS",
            DatasetSource::CmsPuf => "CMS Public Use Files",
            DatasetSource::OpenFda => "OpenFDA",
            DatasetSource::Seer => "SEER Program",
            DatasetSource::Nhanes => "NHANES",
            DatasetSource::Nppes => "NPPES",
            DatasetSource::PubMedCentral => "PubMed Central",
            DatasetSource::Synthea => "Synthea",
            DatasetSource::InternationalRegistries => "International Registries",
            DatasetSource::CheXpertSplits => "SyntheticallyEnhanced: CheXpert",
            DatasetSource::MimicSplits => "SyntheticallyEnhanced: MIMIC",
            DatasetSource::RidCovid => "RID-COVID",
            DatasetSource::RjuaQa => "RJUA-QA",
            DatasetSource::DdxPlus => "DDXPlus Dataset",
            DatasetSource::Luna16 => "LUNA16",
        }
    }

    /// Key used to build `DATASET_<KEY>_*` override variables
    pub fn config_key(&self) -> &'static str {
        match self {
            DatasetSource::DataIngestion => "dataingestion",
            DatasetSource::FireScrapeTool => "firescrapetool",
            DatasetSource::DailyMed => "dailymed",
            DatasetSource::OrangeBook => "orangebook",
            DatasetSource::CdcGuidelines => "cdc",
            DatasetSource::NihSafety => "nihsafety",
            DatasetSource::StatPearls => "statpearls",
            DatasetSource::Uspstf => "uspstf",
            DatasetSource::ClinicalTrials => "clinicaltrials",
            DatasetSource::MedlinePlus => "medlineplus",
            DatasetSource::MimicIv => "mimic_iv",
            DatasetSource::EicuCrd => "eicu_crd",
            DatasetSource::Faers => "faers",
            DatasetSource::CmsPuf => "cms_puf",
            DatasetSource::OpenFda => "openfda",
            DatasetSource::Seer => "seer",
            DatasetSource::Nhanes => "nhanes",
            DatasetSource::Nppes => "nppes",
            DatasetSource::PubMedCentral => "pubmed",
            DatasetSource::Synthea => "synthea",
            DatasetSource::InternationalRegistries => "internationalregistries",
            DatasetSource::CheXpertSplits => "chexpertsplits",
            DatasetSource::MimicSplits => "mimicsplits",
            DatasetSource::RidCovid => "ridcovid",
            DatasetSource::RjuaQa => "rjuaqa",
            DatasetSource::DdxPlus => "ddxplus",
            DatasetSource::Luna16 => "luna16",
        }
    }

    /// Resolve a user-supplied name against the display names, ignoring case
    pub fn resolve(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|source| source.as_str().eq_ignore_ascii_case(name))
    }

    /// Filesystem-safe directory and file prefix for this source
    pub fn slug(&self) -> String {
        slugify(self.as_str())
    }
}

impl std::fmt::Display for DatasetSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase, with every run of characters outside `[a-z0-9]` collapsed to `-`
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut in_gap = false;
    for ch in value.to_lowercase().chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            slug.push(ch);
            in_gap = false;
        } else if !in_gap {
            slug.push('-');
            in_gap = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_resolve_is_case_insensitive() {
        assert_eq!(DatasetSource::resolve("openfda"), Some(DatasetSource::OpenFda));
        assert_eq!(DatasetSource::resolve("OPENFDA"), Some(DatasetSource::OpenFda));
        assert_eq!(
            DatasetSource::resolve("clinicaltrials.GOV"),
            Some(DatasetSource::ClinicalTrials)
        );
        assert_eq!(DatasetSource::resolve("Nope"), None);
    }

    #[test]
    fn test_slugs() {
        assert_eq!(DatasetSource::OpenFda.slug(), "openfda");
        assert_eq!(DatasetSource::CdcGuidelines.slug(), "cdc-nih-guidelines");
        assert_eq!(DatasetSource::CheXpertSplits.slug(), "syntheticallyenhanced-chexpert");
        assert_eq!(DatasetSource::ClinicalTrials.slug(), "clinicaltrials-gov");
        assert_eq!(slugify("a -- b"), "a-b");
    }

    #[test]
    fn test_names_keys_and_slugs_are_unique() {
        let names: HashSet<_> = DatasetSource::ALL.iter().map(|s| s.as_str()).collect();
        let keys: HashSet<_> = DatasetSource::ALL.iter().map(|s| s.config_key()).collect();
        let slugs: HashSet<_> = DatasetSource::ALL.iter().map(|s| s.slug()).collect();
        assert_eq!(names.len(), 27);
        assert_eq!(keys.len(), 27);
        assert_eq!(slugs.len(), 27);
    }

    #[test]
    fn test_serde_uses_display_name() {
        let json = serde_json::to_string(&DatasetSource::NihSafety).unwrap_or_default();
        assert_eq!(json, "\"NIH Drug-Safety\"");
        for source in DatasetSource::ALL {
            let encoded = serde_json::to_value(source).unwrap_or_default();
            assert_eq!(encoded, serde_json::Value::String(source.to_string()));
        }
    }
}
