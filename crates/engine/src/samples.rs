//! Sample experiments for demo sites and local development.

use splitline_core::types::{ExperimentConfig, Variant};

/// Experiments registered by the sample-data bootstrap.
pub fn sample_experiments() -> Vec<ExperimentConfig> {
    let experiments = vec![
        (
            "hero-headline",
            "Hero headline",
            "Benefit-led versus urgency-led hero copy on the landing page",
            50,
            vec!["/"],
            vec!["cta_click", "contact_submit"],
            vec![
                ("control", "Control - Benefit", "Current headline"),
                ("urgency", "Urgency", "Limited-time booking headline"),
            ],
        ),
        (
            "cta-button-color",
            "CTA button color",
            "Primary call-to-action color across the site",
            100,
            vec!["*"],
            vec!["cta_click"],
            vec![
                ("blue", "Control - Blue", "Brand blue button"),
                ("orange", "Orange", "High-contrast orange button"),
                ("green", "Green", "Green button"),
            ],
        ),
        (
            "pricing-layout",
            "Pricing layout",
            "Card grid versus comparison table on the pricing page",
            30,
            vec!["/pricing", "/plans/*"],
            vec!["plan_selected", "checkout_started"],
            vec![
                ("cards", "Control - Cards", "Three pricing cards"),
                ("table", "Comparison table", "Feature comparison table"),
            ],
        ),
    ];

    experiments
        .into_iter()
        .map(
            |(id, name, description, traffic, pages, goals, variants)| ExperimentConfig {
                id: id.to_string(),
                name: name.to_string(),
                description: description.to_string(),
                variants: variants
                    .into_iter()
                    .map(|(vid, vname, vdesc)| Variant {
                        id: vid.to_string(),
                        name: vname.to_string(),
                        description: vdesc.to_string(),
                    })
                    .collect(),
                traffic_allocation: traffic,
                target_pages: pages.into_iter().map(String::from).collect(),
                goals: goals.into_iter().map(String::from).collect(),
            },
        )
        .collect()
}
