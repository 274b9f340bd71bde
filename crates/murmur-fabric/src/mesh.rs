//! Mesh selection helper: filter and rank members for task placement.
//!
//! Telemetry rides in member metadata (`battery`, `charging`, `busy`,
//! `latency_ms`); missing keys fall back to neutral values so a member
//! without telemetry is not excluded by accident.

use crate::Member;

/// Telemetry parsed out of a member's metadata.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemberTelemetry {
    pub battery: Option<f64>,
    pub charging: bool,
    pub busy: bool,
    pub latency_ms: Option<f64>,
}

impl MemberTelemetry {
    pub fn from_member(member: &Member) -> Self {
        let parse_f64 = |key: &str| member.metadata.get(key).and_then(|v| v.parse().ok());
        let parse_bool =
            |key: &str| member.metadata.get(key).map(|v| v == "true").unwrap_or(false);
        Self {
            battery: parse_f64("battery"),
            charging: parse_bool("charging"),
            busy: parse_bool("busy"),
            latency_ms: parse_f64("latency_ms"),
        }
    }
}

/// Hard requirements a member must meet to be considered.
#[derive(Debug, Clone, Default)]
pub struct MeshRequirements {
    pub required_capabilities: Vec<String>,
    pub min_battery: Option<f64>,
    pub require_charging: bool,
    pub allow_busy: bool,
    pub max_latency_ms: Option<f64>,
}

/// Score weights.  All default to 1.
#[derive(Debug, Clone, Copy)]
pub struct MeshWeights {
    pub capability: f64,
    pub battery: f64,
    pub charging: f64,
    pub busy: f64,
    pub latency: f64,
}

impl Default for MeshWeights {
    fn default() -> Self {
        Self {
            capability: 1.0,
            battery: 1.0,
            charging: 1.0,
            busy: 1.0,
            latency: 1.0,
        }
    }
}

/// Filter predicate: unavailable members, missing capabilities, low
/// battery, not-charging-when-required, busy-when-not-allowed, and
/// over-latency members are all rejected.
pub fn eligible(member: &Member, requirements: &MeshRequirements) -> bool {
    if !member.available {
        return false;
    }
    if !requirements
        .required_capabilities
        .iter()
        .all(|cap| member.provides_capability(cap))
    {
        return false;
    }
    let telemetry = MemberTelemetry::from_member(member);
    if let Some(min) = requirements.min_battery {
        match telemetry.battery {
            Some(level) if level >= min => {}
            _ => return false,
        }
    }
    if requirements.require_charging && !telemetry.charging {
        return false;
    }
    if !requirements.allow_busy && telemetry.busy {
        return false;
    }
    if let Some(cap) = requirements.max_latency_ms {
        if telemetry.latency_ms.map(|l| l > cap).unwrap_or(false) {
            return false;
        }
    }
    true
}

/// Score one member:
/// `(caps ? w_cap : 0) + (battery > 0.5 ? w_battery : 0) +
///  (charging ? w_charging : 0) - (busy ? w_busy : 0) -
///  (latency_ms / 100) * w_latency`.
pub fn score(member: &Member, requirements: &MeshRequirements, weights: &MeshWeights) -> f64 {
    let telemetry = MemberTelemetry::from_member(member);
    let all_caps = requirements
        .required_capabilities
        .iter()
        .all(|cap| member.provides_capability(cap));

    let mut score = 0.0;
    if all_caps {
        score += weights.capability;
    }
    if telemetry.battery.map(|b| b > 0.5).unwrap_or(false) {
        score += weights.battery;
    }
    if telemetry.charging {
        score += weights.charging;
    }
    if telemetry.busy {
        score -= weights.busy;
    }
    if let Some(latency) = telemetry.latency_ms {
        score -= (latency / 100.0) * weights.latency;
    }
    score
}

/// Filter, rank by descending score, and return the top `n`.
pub fn select(
    members: &[Member],
    requirements: &MeshRequirements,
    weights: &MeshWeights,
    n: usize,
) -> Vec<Member> {
    let mut ranked: Vec<(f64, &Member)> = members
        .iter()
        .filter(|m| eligible(m, requirements))
        .map(|m| (score(m, requirements, weights), m))
        .collect();
    ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    ranked.into_iter().take(n).map(|(_, m)| m.clone()).collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, battery: &str, charging: bool, busy: bool, latency: &str) -> Member {
        Member::new(id)
            .providing(["agent.action.build"])
            .with_metadata("battery", battery)
            .with_metadata("charging", if charging { "true" } else { "false" })
            .with_metadata("busy", if busy { "true" } else { "false" })
            .with_metadata("latency_ms", latency)
    }

    fn build_req() -> MeshRequirements {
        MeshRequirements {
            required_capabilities: vec!["agent.action.build".into()],
            ..Default::default()
        }
    }

    #[test]
    fn telemetry_parses_metadata() {
        let m = node("n", "0.75", true, false, "42");
        let t = MemberTelemetry::from_member(&m);
        assert_eq!(t.battery, Some(0.75));
        assert!(t.charging);
        assert!(!t.busy);
        assert_eq!(t.latency_ms, Some(42.0));
    }

    #[test]
    fn missing_telemetry_is_neutral() {
        let m = Member::new("bare");
        let t = MemberTelemetry::from_member(&m);
        assert_eq!(t.battery, None);
        assert!(!t.charging);
        assert!(!t.busy);
    }

    #[test]
    fn filter_rejects_unavailable_and_missing_caps() {
        let req = build_req();
        assert!(!eligible(&node("a", "1.0", true, false, "1").unavailable(), &req));
        assert!(!eligible(&Member::new("no-caps"), &req));
        assert!(eligible(&node("ok", "1.0", true, false, "1"), &req));
    }

    #[test]
    fn filter_enforces_battery_charging_busy_latency() {
        let mut req = build_req();
        req.min_battery = Some(0.5);
        assert!(!eligible(&node("low", "0.2", true, false, "1"), &req));
        // No battery reading at all fails a min-battery requirement.
        let mut no_batt = Member::new("nb").providing(["agent.action.build"]);
        no_batt.metadata.insert("charging".into(), "true".into());
        assert!(!eligible(&no_batt, &req));

        req.min_battery = None;
        req.require_charging = true;
        assert!(!eligible(&node("unplugged", "0.9", false, false, "1"), &req));

        req.require_charging = false;
        assert!(!eligible(&node("busy", "0.9", true, true, "1"), &req));
        req.allow_busy = true;
        assert!(eligible(&node("busy", "0.9", true, true, "1"), &req));

        req.max_latency_ms = Some(100.0);
        assert!(!eligible(&node("far", "0.9", true, true, "250"), &req));
        assert!(eligible(&node("near", "0.9", true, true, "50"), &req));
    }

    #[test]
    fn score_follows_the_formula() {
        let req = build_req();
        let w = MeshWeights::default();
        // caps (1) + battery>0.5 (1) + charging (1) - busy (0) - 0.5*1
        let m = node("m", "0.9", true, false, "50");
        assert!((score(&m, &req, &w) - 2.5).abs() < 1e-9);

        // busy subtracts, low battery adds nothing.
        let m = node("m2", "0.3", false, true, "100");
        assert!((score(&m, &req, &w) - (1.0 - 1.0 - 1.0)).abs() < 1e-9);
    }

    #[test]
    fn select_ranks_descending_and_truncates() {
        let req = build_req();
        let w = MeshWeights::default();
        let members = vec![
            node("slow", "0.9", false, false, "400"),
            node("best", "0.9", true, false, "10"),
            node("mid", "0.9", false, false, "10"),
        ];
        let top = select(&members, &req, &w, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].id, "best");
        assert_eq!(top[1].id, "mid");
    }

    #[test]
    fn select_excludes_ineligible_before_ranking() {
        let req = build_req();
        let w = MeshWeights::default();
        let members = vec![
            node("good", "0.9", true, false, "10"),
            node("down", "0.9", true, false, "10").unavailable(),
        ];
        let top = select(&members, &req, &w, 10);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].id, "good");
    }
}
