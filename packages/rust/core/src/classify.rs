//! Lexical campaign-name classification.
//!
//! Exports carry no structured segment column, so the segment is read off
//! the campaign name. Labels overlap ("Branded Competitor PAT"), which makes
//! the precedence order below load-bearing: first match wins.

use goalforge_shared::{CampaignKey, MatchType, Segment};

/// Map a campaign name to its coarse segment.
pub fn detect_segment(campaign_name: &str) -> Segment {
    let name = campaign_name.to_uppercase();
    let branded = name.contains("BRANDED");
    let pat = name.contains("PAT");

    if branded && pat {
        Segment::BrandedPat
    } else if branded {
        Segment::BrandedKw
    } else if name.contains("COMPETITOR") && name.contains("MANUAL") {
        Segment::CompetitorKw
    } else if pat {
        Segment::CompetitorPat
    } else if name.contains("MANUAL") {
        Segment::UnbrandedKw
    } else if name.contains("AUTO") {
        Segment::Auto
    } else {
        Segment::Unknown
    }
}

/// Map a campaign name (plus an optional explicit match type) to the
/// aggregation bucket. Without an explicit match type it is inferred from
/// the name, defaulting to exact.
pub fn detect_campaign_key(campaign_name: &str, match_type: Option<MatchType>) -> CampaignKey {
    let match_type = match_type
        .or_else(|| MatchType::from_text(campaign_name))
        .unwrap_or(MatchType::Exact);

    match detect_segment(campaign_name) {
        Segment::BrandedPat => CampaignKey::BrandedPat,
        Segment::BrandedKw => match match_type {
            MatchType::Exact => CampaignKey::BrandedExact,
            MatchType::Phrase => CampaignKey::BrandedPhrase,
            MatchType::Broad => CampaignKey::BrandedBroad,
            MatchType::Pat => CampaignKey::BrandedPat,
        },
        Segment::CompetitorPat => CampaignKey::CompetitorPat,
        Segment::CompetitorKw => match match_type {
            MatchType::Exact => CampaignKey::CompetitorExact,
            MatchType::Phrase => CampaignKey::CompetitorPhrase,
            MatchType::Broad => CampaignKey::CompetitorBroad,
            MatchType::Pat => CampaignKey::CompetitorPat,
        },
        // Unbranded has no PAT bucket; targeting defaults to competitor PAT.
        Segment::UnbrandedKw => match match_type {
            MatchType::Exact => CampaignKey::UnbrandedExact,
            MatchType::Phrase => CampaignKey::UnbrandedPhrase,
            MatchType::Broad => CampaignKey::UnbrandedBroad,
            MatchType::Pat => CampaignKey::CompetitorPat,
        },
        Segment::Auto => CampaignKey::Auto,
        Segment::Unknown => CampaignKey::Unknown,
    }
}
