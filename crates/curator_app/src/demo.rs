//! Simulated host: an infinite-scroll feed rendered into a [`MemoryTree`]
//! while the engine curates it.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use curator_core::{MemoryTree, PolicyStore, Reconciler, SurfaceExtractor};
use curator_engine::{ClassificationClient, CurationEngine};
use curator_logging::{curator_debug, curator_info};
use tokio::sync::mpsc;

use crate::config::AppConfig;

const TITLES: &[(&str, &str)] = &[
    ("Election night recap", "Politics Daily"),
    ("Sourdough from scratch", "Home Kitchen"),
    ("Five minute stretches", "Move Better"),
    ("Senate hearing highlights", "Capitol Watch"),
    ("Cooking rice the easy way", "Home Kitchen"),
    ("Trail running in the rain", "Outdoors"),
    ("Why the budget vote failed", "Politics Daily"),
    ("Build a tiny bookshelf", "Maker Bench"),
];

/// Renders rows the way a host feed would: items, the odd shelf and short.
struct FeedHost {
    tree: MemoryTree,
    rendered: usize,
}

impl FeedHost {
    fn new(tree: MemoryTree) -> Self {
        Self { tree, rendered: 0 }
    }

    fn render(&mut self, count: usize) {
        for _ in 0..count {
            let n = self.rendered;
            self.rendered += 1;
            let (title, channel) = TITLES[n % TITLES.len()];
            let href = format!("/watch?v=vid{n:04}");
            if n % 7 == 6 {
                self.tree.push_node(
                    "item",
                    &[("href", &href), ("title", title), ("data-short", "1")],
                );
            } else {
                self.tree.push_node(
                    "item",
                    &[("href", &href), ("title", title), ("channel", channel)],
                );
            }
            if n % 10 == 9 {
                self.tree.push_node("shelf", &[]);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoSummary {
    pub rendered: usize,
    pub cycles: usize,
    pub mutations: usize,
    pub visible: usize,
    pub parked: usize,
    pub engine_writes: usize,
}

impl fmt::Display for DemoSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rendered {} item(s), {} cycle(s), {} mutation(s); {} visible, {} parked, {} tree write(s)",
            self.rendered, self.cycles, self.mutations, self.visible, self.parked, self.engine_writes
        )
    }
}

pub async fn run(config: AppConfig) -> Result<DemoSummary> {
    let tree = MemoryTree::new();
    let mut host = FeedHost::new(tree.clone());
    host.render(config.demo.items_per_tick);

    let store = PolicyStore::new(config.filters.clone());
    let classifier = config.classifier.build(&config.client)?;
    let client = ClassificationClient::new(classifier, store.clone(), config.client.settings());
    let reconciler = Reconciler::new(
        tree.clone(),
        SurfaceExtractor::new(config.surface_profile()),
        config.reconciler_config(),
        store.get_active_policy(),
    );

    let (report_tx, mut reports) = mpsc::unbounded_channel();
    let (engine, handle) = CurationEngine::new(reconciler, client, store.clone());
    let engine = engine.with_reports(report_tx);
    let hook = handle.clone();
    tree.set_change_hook(move || hook.host_changed());
    let task = tokio::spawn(engine.run());

    let mut cycles = 0;
    let mut mutations = 0;
    let mut interval = tokio::time::interval(Duration::from_millis(config.demo.tick_ms.max(1)));
    for tick in 0..config.demo.ticks {
        interval.tick().await;
        if let Some(switch) = &config.demo.policy_switch {
            if switch.at_tick == tick {
                curator_info!("demo: switching filters to {:?}", switch.filters);
                store.replace_filters(switch.filters.clone());
            }
        }
        host.render(config.demo.items_per_tick);
        while let Ok(report) = reports.try_recv() {
            curator_debug!("demo: cycle {} -> {} visible", report.cycle, report.visible.len());
            cycles += 1;
            mutations += report.mutations();
        }
    }

    // Let the last debounce window close before stopping.
    tokio::time::sleep(config.reconciler.watcher.debounce() * 2).await;
    handle.shutdown();
    let reconciler = task.await.context("engine task failed")?;
    while let Ok(report) = reports.try_recv() {
        cycles += 1;
        mutations += report.mutations();
    }

    let summary = DemoSummary {
        rendered: host.rendered,
        cycles,
        mutations,
        visible: reconciler.state().last_applied_order.len(),
        parked: reconciler.parked_ids().len(),
        engine_writes: tree.engine_writes(),
    };
    curator_info!("demo finished: {}", summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PolicySwitch, SurfacePreset};
    use curator_core::{CycleStep, Trigger};

    fn hrefs(tree: &MemoryTree) -> Vec<String> {
        tree.visible_attribute("href")
    }

    #[test]
    fn host_renders_shorts_and_shelves() {
        let tree = MemoryTree::new();
        let mut host = FeedHost::new(tree.clone());
        host.render(10);
        assert_eq!(hrefs(&tree).len(), 10);
        assert_eq!(tree.child_ids().len(), 11);
        assert!(tree
            .child_ids()
            .iter()
            .any(|id| tree.attribute_of(*id, "data-short").is_some()));
    }

    #[test]
    fn results_preset_strips_reel_shelves_and_chips() {
        curator_logging::initialize_for_tests();
        let mut config = AppConfig::default();
        config.filters = Vec::new();
        config.surface.preset = Some(SurfacePreset::Results);

        let tree = MemoryTree::new();
        tree.push_node("chips", &[]);
        for n in 0..12 {
            tree.push_item(&format!("/watch?v=r{n}"), "result");
        }
        tree.push_node("reel-shelf", &[]);

        let store = PolicyStore::new(Vec::new());
        let mut reconciler = Reconciler::new(
            tree.clone(),
            SurfaceExtractor::new(config.surface_profile()),
            config.reconciler_config(),
            store.get_active_policy(),
        );
        match reconciler.begin_cycle(Trigger::Initial, std::time::Instant::now()) {
            CycleStep::Completed(report) => assert_eq!(report.removed, 2),
            other => panic!("expected a completed cycle, got {other:?}"),
        }
        assert_eq!(hrefs(&tree).len(), 12);
        assert_eq!(tree.child_ids().len(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn demo_hides_filtered_items() {
        curator_logging::initialize_for_tests();
        let mut config = AppConfig::default();
        config.demo.ticks = 4;
        config.demo.items_per_tick = 4;
        config.demo.policy_switch = None;

        let summary = run(config).await.unwrap();
        assert_eq!(summary.rendered, 20);
        assert!(summary.cycles > 0);
        assert!(summary.mutations > 0);
        assert!(summary.visible < summary.rendered);
        assert!(summary.parked > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sidebar_preset_caps_visible_items() {
        curator_logging::initialize_for_tests();
        let mut config = AppConfig::default();
        config.filters = Vec::new();
        config.surface.preset = Some(SurfacePreset::Sidebar);
        config.demo.ticks = 3;
        config.demo.policy_switch = Some(PolicySwitch {
            at_tick: 1,
            filters: vec!["cooking".to_string()],
        });

        let summary = run(config).await.unwrap();
        assert_eq!(summary.visible, 2);
    }
}
