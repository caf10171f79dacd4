//! ApiResource construction for dynamically typed objects

use kube::discovery::ApiResource;

/// Known pluralizations for the kinds conformance tests touch
const KIND_PLURALS: &[(&str, &str)] = &[
    // Ingress operator
    ("ingresscontroller", "ingresscontrollers"),
    ("dnsrecord", "dnsrecords"),
    // Route API
    ("route", "routes"),
    // Gateway API
    ("gateway", "gateways"),
    ("gatewayclass", "gatewayclasses"),
    ("httproute", "httproutes"),
    ("grpcroute", "grpcroutes"),
    ("referencegrant", "referencegrants"),
    // Core and apps
    ("deployment", "deployments"),
    ("pod", "pods"),
    ("service", "services"),
    ("endpoints", "endpoints"),
    ("endpointslice", "endpointslices"),
    ("configmap", "configmaps"),
    ("secret", "secrets"),
    ("ingress", "ingresses"),
    ("ingressclass", "ingressclasses"),
];

/// Split an apiVersion into (group, version); the core group is ""
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Pluralize a Kubernetes resource kind
///
/// Uses a lookup table for known kinds, falling back to simple
/// pluralization rules for everything else.
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    if let Some((_, plural)) = KIND_PLURALS.iter().find(|(singular, _)| *singular == lower) {
        return (*plural).to_string();
    }

    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

/// Build an ApiResource from an explicit apiVersion and kind
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}
