
use std::sync::Arc;

use futures::future::BoxFuture;
use rowsync::{
    Cancelled, Change, Collection, Emitter, EventKind, Failure, Fetched, Grid, GridConfig,
    GridError, MemoryCollection, MemoryRenderer, Record, RecordId, RenderOptions, Renderer,
    SortCriterion,
};
use serde_json::{json, Value};

use common::*;

#[tokio::test]
async fn renders_the_sorted_view() {
    let collection = people();
    let (grid, renderer) = grid_with(&collection, config()).await;

    assert_eq!(row_ids(&grid), some(&["2", "3", "1"]));
    assert_eq!(drawn_ids(&renderer), some(&["2", "3", "1"]));
    assert_eq!(collection.observer_count(), 1);
    assert_eq!(grid.observer_count(), 1);

    let indices = grid.rows().iter().flatten().map(|row| row.index).collect::<Vec<_>>();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[tokio::test]
async fn changing_the_sort_rebuilds_one_view() {
    let collection = people();
    let (grid, renderer) = grid_with(&collection, config()).await;
    let fetches = collection.calls().fetches;

    grid.set_sort(vec![SortCriterion::descending("age")]).await.unwrap();

    assert_eq!(collection.calls().fetches, fetches + 1);
    assert_eq!(collection.observer_count(), 1);
    assert_eq!(row_ids(&grid), some(&["2", "1", "3"]));
    assert_eq!(drawn_ids(&renderer), some(&["2", "1", "3"]));
    assert_eq!(grid.sort(), vec![SortCriterion::descending("age")]);
}

#[tokio::test]
async fn criteria_are_applied_in_order() {
    let collection = people();
    collection
        .add(record(json!({ "id": 4, "name": "Dave", "age": 30 })))
        .unwrap();
    let (grid, _renderer) = grid_with(&collection, config()).await;

    grid.set_sort(vec![
        SortCriterion::ascending("age"),
        SortCriterion::descending("name"),
    ])
    .await
    .unwrap();

    assert_eq!(row_ids(&grid), some(&["3", "4", "1", "2"]));
}

#[tokio::test]
async fn sorting_without_a_collection_is_left_to_the_renderer() {
    let renderer = Arc::new(MemoryRenderer::new());
    let grid = Grid::new(config(), renderer.clone());

    let drawn = grid.set_sort(vec![SortCriterion::ascending("age")]).await.unwrap();

    assert_eq!(drawn, 0);
    assert!(grid.sorted_view().is_none());
    assert_eq!(
        renderer.log().collectionless_sorts,
        vec![vec![SortCriterion::ascending("age")]]
    );
    assert_eq!(grid.refresh(RenderOptions::default()).await.unwrap(), 0);
}

#[tokio::test]
async fn replacing_the_collection_moves_observation() {
    let first = people();
    let (grid, renderer) = grid_with(&first, config()).await;
    grid.update_dirty(1u64, "name", "Edited");

    let second = MemoryCollection::from_values([json!({ "id": 9, "name": "Zoe" })]).unwrap();
    grid.set_collection(Some(Arc::new(second.clone()))).await.unwrap();

    assert_eq!(first.observer_count(), 0);
    assert_eq!(second.observer_count(), 1);
    assert!(grid.dirty().is_empty());
    assert_eq!(drawn_ids(&renderer), some(&["9"]));

    first
        .add(record(json!({ "id": 5, "name": "Ann" })))
        .unwrap();
    assert_eq!(row_ids(&grid), some(&["9"]));

    grid.set_collection(None).await.unwrap();
    assert_eq!(second.observer_count(), 0);
    assert!(grid.sorted_view().is_none());
}

#[tokio::test]
async fn added_records_are_drawn_in_place() {
    let collection = people();
    let (grid, renderer) = grid_with(&collection, config()).await;

    collection
        .add(record(json!({ "id": 4, "name": "Ben", "age": 20 })))
        .unwrap();

    assert_eq!(row_ids(&grid), some(&["2", "4", "3", "1"]));
    assert_eq!(drawn_ids(&renderer), some(&["2", "4", "3", "1"]));
    let added = grid.rows().find(&id("4")).unwrap().handle;
    assert_eq!(renderer.log().highlighted, vec![added]);

    let indices = grid.rows().iter().flatten().map(|row| row.index).collect::<Vec<_>>();
    assert_eq!(indices, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn moved_records_follow_the_view() {
    let collection = people();
    let (grid, renderer) = grid_with(&collection, config()).await;
    let bob = grid.rows().find(&id("3")).unwrap().handle;

    let mut alice = collection.record(&id("2")).unwrap();
    alice.set("name", "Zed");
    collection.add(alice).unwrap();

    assert_eq!(row_ids(&grid), some(&["3", "1", "2"]));
    assert_eq!(drawn_ids(&renderer), some(&["3", "1", "2"]));
    assert_eq!(renderer.log().adjusted, vec![bob]);
    let zed = grid.rows().find(&id("2")).unwrap().clone();
    assert_eq!(zed.index, 2);
    assert_eq!(zed.data.get("name"), Some(&json!("Zed")));
}

#[tokio::test]
async fn updates_in_place_redraw_the_row() {
    let collection = people();
    let (grid, renderer) = grid_with(&collection, config()).await;
    let before = grid.rows().find(&id("3")).unwrap().handle;

    let mut bob = collection.record(&id("3")).unwrap();
    bob.set("age", 26);
    collection.add(bob).unwrap();

    assert_eq!(row_ids(&grid), some(&["2", "3", "1"]));
    let after = grid.rows().find(&id("3")).unwrap().handle;
    assert_ne!(before, after);
    assert_eq!(renderer.node(after).unwrap().record.get("age"), Some(&json!(26)));
    assert_eq!(renderer.log().removed, vec![(before, false)]);
    assert!(renderer.log().adjusted.is_empty());
    assert_eq!(renderer.log().scroll_requests, 0);
}

#[tokio::test]
async fn removing_rows_asks_for_more_and_reports_no_data() {
    let collection = people();
    let config = GridConfig {
        no_data_message: "Nobody here".to_string(),
        fill_threshold: 2,
        ..config()
    };
    let (grid, renderer) = grid_with(&collection, config).await;
    let events = Events::listen(&grid);

    collection.remove(&id("2"));
    assert_eq!(row_ids(&grid), some(&["3", "1"]));
    assert_eq!(renderer.log().scroll_requests, 0);

    collection.remove(&id("1"));
    assert_eq!(renderer.log().scroll_requests, 1);

    collection.remove(&id("3"));
    assert!(grid.rows().is_empty());
    assert_eq!(renderer.row_count(), 0);
    assert_eq!(
        events.count(|kind| matches!(kind, EventKind::NoData(message) if message == "Nobody here")),
        1
    );

    collection
        .add(record(json!({ "id": 7, "name": "Newcomer" })))
        .unwrap();
    assert_eq!(row_ids(&grid), some(&["7"]));
    assert_eq!(events.count(|kind| matches!(kind, EventKind::RowsAvailable)), 1);
}

#[tokio::test]
async fn first_row_goes_before_the_first_sibling() {
    let collection = MemoryCollection::new();
    let renderer = Arc::new(MemoryRenderer::new());
    let footer = renderer.insert_row(&Record::new(), None, None, 0, &RenderOptions::default());
    renderer.set_first_sibling(Some(footer));
    let grid = Grid::builder(renderer.clone())
        .config(config())
        .collection(Arc::new(collection.clone()))
        .build()
        .await;
    assert!(grid.rows().is_empty());

    collection.add(record(json!({ "id": 1, "name": "Only" }))).unwrap();

    let only = grid.rows().find(&id("1")).unwrap().handle;
    assert_eq!(renderer.order(), vec![only, footer]);
}

#[tokio::test]
async fn changes_outside_the_drawn_rows_keep_a_placeholder() {
    let collection = people();
    let (grid, renderer) = grid_with(&collection, config()).await;

    grid.on_notification(Change::added(record(json!({ "id": 9, "name": "Far" })), 10));

    let rows = grid.rows();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows.rendered_count(), 3);
    assert_eq!(rows.placeholder_count(), 1);
    assert_eq!(renderer.row_count(), 3);

    grid.on_notification(Change::removed(record(json!({ "id": 9, "name": "Far" })), 3));
    assert_eq!(row_ids(&grid), some(&["2", "3", "1"]));
}

#[tokio::test]
async fn detached_anchors_are_found_again() {
    let collection = people();
    let (grid, renderer) = grid_with(&collection, config()).await;
    let bob = grid.rows().find(&id("3")).unwrap().handle;
    let redrawn = renderer.redraw(bob).unwrap();

    collection
        .add(record(json!({ "id": 4, "name": "Ben" })))
        .unwrap();

    assert_eq!(drawn_ids(&renderer), some(&["2", "4", "3", "1"]));
    assert_eq!(grid.rows().find(&id("3")).unwrap().handle, redrawn);
}

#[tokio::test]
async fn rows_are_not_placed_between_a_row_and_its_children() {
    let collection = people();
    let (grid, renderer) = grid_with(&collection, config()).await;
    let carol = grid.rows().find(&id("1")).unwrap().handle;
    let child = renderer
        .insert_child(carol, record(json!({ "name": "Carol's child" })))
        .unwrap();

    collection
        .add(record(json!({ "id": 5, "name": "Dan" })))
        .unwrap();

    let dan = grid.rows().find(&id("5")).unwrap().handle;
    let order = renderer.order();
    assert_eq!(order[order.len() - 2..], [child, dan]);
    assert_eq!(row_ids(&grid), some(&["2", "3", "1", "5"]));
}

/// Drawn rows must form a prefix of the sequence that matches the start of
/// the full view, one for one.
async fn assert_aligned(
    grid: &Grid,
    renderer: &MemoryRenderer,
    collection: &MemoryCollection,
    page: Option<usize>,
) {
    collection.page_fetches(None);
    let view = view_ids(grid).await;
    collection.page_fetches(page);

    let rows = grid.rows();
    assert_eq!(rows.len(), rows.rendered_count() + rows.placeholder_count());
    let drawn = rows.rendered_count();
    for (position, row) in rows.iter().enumerate() {
        let Some(row) = row else {
            assert!(position >= drawn, "placeholder in front of a drawn row");
            continue;
        };
        assert!(position < drawn, "drawn row behind a placeholder");
        assert_eq!(row.index, position);
        assert_eq!(row.id.as_ref().map(ToString::to_string), view[position]);
        let node = renderer.node(row.handle).unwrap();
        assert_eq!(node.record, collection.record(row.id.as_ref().unwrap()).unwrap());
    }
    assert_eq!(drawn_ids(renderer), row_ids(grid)[..drawn].to_vec());
    if page.is_none() {
        assert_eq!(row_ids(grid), view);
    }
}

async fn shuffle_records(page: Option<usize>) -> usize {
    let collection = people();
    for id in 4..10 {
        collection
            .add(record(json!({ "id": id, "name": format!("P{}", id) })))
            .unwrap();
    }
    collection.page_fetches(page);
    let (grid, renderer) = grid_with(&collection, config()).await;
    collection.defer_fetches(true);

    let names = ["Ann", "Bea", "Cid", "Dot", "Eve", "Zed", "Ann", "Bea"];
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move |bound: usize| {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        (seed % bound as u64) as usize
    };
    let mut next_id = 100;
    let mut placeholders = 0;

    for _ in 0..300 {
        let ids = collection.ids();
        let action = next(4);
        let name = names[next(names.len())];
        let target = (!ids.is_empty()).then(|| ids[next(ids.len())].clone());
        let new_id = next_id;
        next_id += 1;
        let change = || match (action, &target) {
            (1, Some(target)) | (3, Some(target)) => {
                let mut changed = collection.record(target).unwrap();
                changed.set("name", name);
                collection.add(changed).unwrap();
            }
            (2, Some(target)) => {
                collection.remove(target);
            }
            _ => {
                collection
                    .add(record(json!({ "id": new_id, "name": name })))
                    .unwrap();
            }
        };

        if action == 3 {
            let (refreshed, ()) = tokio::join!(grid.refresh(RenderOptions::default()), async {
                change()
            });
            refreshed.unwrap();
        } else {
            change();
        }

        placeholders = placeholders.max(grid.rows().placeholder_count());
        assert_aligned(&grid, &renderer, &collection, page).await;
    }
    placeholders
}

#[tokio::test]
async fn rows_stay_aligned_with_the_view() {
    assert_eq!(shuffle_records(None).await, 0);
}

#[tokio::test]
async fn paged_rows_stay_aligned_with_the_view() {
    assert!(shuffle_records(Some(4)).await > 0);
}

#[tokio::test]
async fn changes_during_a_refresh_are_drawn_once() {
    let collection = people();
    let (grid, renderer) = grid_with(&collection, config()).await;
    collection.defer_fetches(true);

    let (refreshed, ()) = tokio::join!(grid.refresh(RenderOptions::default()), async {
        collection
            .add(record(json!({ "id": 9, "name": "Zed" })))
            .unwrap();
    });

    assert_eq!(refreshed.unwrap(), 4);
    assert_eq!(row_ids(&grid), some(&["2", "3", "1", "9"]));
    assert_eq!(drawn_ids(&renderer), some(&["2", "3", "1", "9"]));
    assert_eq!(renderer.row_count(), 4);
}

#[tokio::test]
async fn first_row_of_an_empty_grid_is_numbered_zero() {
    let collection = MemoryCollection::new();
    let (grid, renderer) = grid_with(&collection, config()).await;

    grid.on_notification(Change::added(record(json!({ "id": 1, "name": "Only" })), 5));

    let row = grid.rows().get(0).cloned().unwrap();
    assert_eq!(row.index, 0);
    assert_eq!(renderer.node(row.handle).unwrap().index, 0);
}

#[tokio::test]
async fn failed_fetches_raise_one_error_each() {
    let collection = people();
    let (grid, _renderer) = grid_with(&collection, config()).await;
    let events = Events::listen(&grid);

    collection.fail_fetch(Some(Failure::Immediate("Error on sync query".into())));
    assert!(grid.refresh(RenderOptions::default()).await.is_err());
    collection.fail_fetch(Some(Failure::Deferred("Error on async query".into())));
    assert!(grid.refresh(RenderOptions::default()).await.is_err());

    let errors = events.errors();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|error| error.host == "people"));
    assert_eq!(errors[0].to_string(), "people: Error on sync query");
    assert_eq!(errors[1].to_string(), "people: Error on async query");
    assert!(grid.rows().is_empty());

    collection.fail_fetch(Some(Failure::Cancelled));
    let err = grid.refresh(RenderOptions::default()).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(events.errors().len(), 2);
}

#[tokio::test]
async fn superseded_refreshes_are_cancelled_quietly() {
    let collection = people();
    let (grid, renderer) = grid_with(&collection, config()).await;
    let events = Events::listen(&grid);
    collection.defer_fetches(true);

    let (first, second) = tokio::join!(
        grid.refresh(RenderOptions::default()),
        grid.refresh(RenderOptions::default())
    );

    assert!(first.unwrap_err().is_cancelled());
    assert_eq!(second.unwrap(), 3);
    assert!(events.errors().is_empty());
    assert_eq!(events.count(|kind| matches!(kind, EventKind::Loading(_))), 2);
    assert_eq!(drawn_ids(&renderer), some(&["2", "3", "1"]));
}

#[tokio::test]
async fn superseded_failures_are_not_reported() {
    let collection = people();
    let (grid, _renderer) = grid_with(&collection, config()).await;
    let events = Events::listen(&grid);
    collection.defer_fetches(true);
    collection.fail_fetch(Some(Failure::Deferred("down".into())));

    let (first, second) = tokio::join!(
        grid.refresh(RenderOptions::default()),
        grid.refresh(RenderOptions::default())
    );

    assert!(first.unwrap_err().is_cancelled());
    assert!(!second.unwrap_err().is_cancelled());
    let errors = events.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].to_string(), "people: down");
}

#[tokio::test]
async fn guarding_grid_operations_reports_each_failure_once() {
    let collection = people();
    let (grid, _renderer) = grid_with(&collection, config()).await;
    let events = Events::listen(&grid);
    collection.fail_fetch(Some(Failure::Immediate("down".into())));

    let err = grid
        .guard_async(grid.refresh(RenderOptions::default()))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "people: down");
    assert_eq!(events.errors().len(), 1);

    let nested = grid
        .guard_async(async {
            grid.set_sort(vec![SortCriterion::descending("age")]).await?;
            Ok::<_, anyhow::Error>(())
        })
        .await
        .unwrap_err();
    assert_eq!(nested.to_string(), "people: down");
    assert_eq!(events.errors().len(), 2);
}

#[tokio::test]
async fn guarding_a_superseded_operation_stays_quiet() {
    let collection = people();
    let (grid, _renderer) = grid_with(&collection, config()).await;
    let events = Events::listen(&grid);
    collection.defer_fetches(true);

    let (guarded, refreshed) = tokio::join!(
        grid.guard_async(grid.set_sort(vec![SortCriterion::descending("age")])),
        grid.refresh(RenderOptions::default())
    );

    assert!(guarded.unwrap_err().is_cancelled());
    assert_eq!(refreshed.unwrap(), 3);
    let cancelled = grid
        .guard(|| Err::<(), _>(GridError::new("people", Cancelled.into())))
        .unwrap_err();
    assert!(cancelled.is_cancelled());
    assert!(events.errors().is_empty());
    assert_eq!(row_ids(&grid), some(&["2", "1", "3"]));
}

#[tokio::test]
async fn failures_during_the_first_render_bubble_to_the_parent() {
    let collection = people();
    collection.fail_fetch(Some(Failure::Immediate("offline".into())));
    let parent = Emitter::new();
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _listener = parent.listen(move |event| {
        if let Some(error) = event.error() {
            sink.lock().unwrap().push((event.host.clone(), error.to_string(), event.cancelable));
        }
    });

    let grid = Grid::builder(Arc::new(MemoryRenderer::new()))
        .config(config())
        .collection(Arc::new(collection.clone()))
        .parent(parent)
        .build()
        .await;

    assert!(grid.rows().is_empty());
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        [("people".to_string(), "people: offline".to_string(), true)]
    );
}

#[tokio::test]
async fn destroy_stops_observation() {
    let collection = people();
    let (grid, renderer) = grid_with(&collection, config()).await;

    grid.destroy();

    assert_eq!(collection.observer_count(), 0);
    assert!(grid.rows().is_empty());
    assert_eq!(renderer.row_count(), 0);
    assert!(renderer.log().removed.iter().all(|(_, cleanup)| *cleanup));

    collection.add(record(json!({ "id": 4, "name": "Ben" }))).unwrap();
    assert!(grid.rows().is_empty());
}

/// Collection that can't be observed, wrapping one that can.
struct Unobserved(Arc<dyn Collection>);

impl Collection for Unobserved {
    fn get(&self, id: &RecordId) -> BoxFuture<'_, anyhow::Result<Option<Record>>> {
        self.0.get(id)
    }

    fn put(&self, record: Record) -> BoxFuture<'_, anyhow::Result<()>> {
        self.0.put(record)
    }

    fn sort(&self, attribute: &str, descending: bool) -> Arc<dyn Collection> {
        Arc::new(Unobserved(self.0.sort(attribute, descending)))
    }

    fn fetch(&self) -> BoxFuture<'_, anyhow::Result<Fetched>> {
        self.0.fetch()
    }
}

#[tokio::test]
async fn writes_to_an_unobserved_collection_refresh_the_grid() {
    let collection = people();
    let renderer = Arc::new(MemoryRenderer::new());
    let grid = Grid::builder(renderer.clone())
        .config(config())
        .collection(Arc::new(Unobserved(Arc::new(collection.clone()))))
        .build()
        .await;
    assert_eq!(grid.observer_count(), 0);

    let ben = record(json!({ "id": 4, "name": "Ben" }));
    collection.add(ben.clone()).unwrap();
    assert_eq!(row_ids(&grid), some(&["2", "3", "1"]));

    let fetches = collection.calls().fetches;
    let drawn = grid.handle_store_notify(Some(&ben), None).await.unwrap();
    assert_eq!(drawn, 4);
    assert_eq!(collection.calls().fetches, fetches + 1);
    assert_eq!(drawn_ids(&renderer), some(&["2", "4", "3", "1"]));

    assert_eq!(grid.handle_store_notify(None, Some(&id("4"))).await.unwrap(), 0);
    assert_eq!(collection.calls().fetches, fetches + 1);
}

#[tokio::test]
async fn observed_grids_ignore_store_notify() {
    let collection = people();
    let (grid, _renderer) = grid_with(&collection, config()).await;
    let fetches = collection.calls().fetches;

    let record = record(json!({ "id": 1, "name": "Carol" }));
    assert_eq!(grid.handle_store_notify(Some(&record), None).await.unwrap(), 0);
    assert_eq!(collection.calls().fetches, fetches);
}

#[tokio::test]
async fn guarded_operations_report_through_the_grid() {
    let collection = people();
    let (grid, _renderer) = grid_with(&collection, config()).await;
    let events = Events::listen(&grid);
    let _silence = grid.emitter().listen(|event| event.cancel());

    let value = grid.guard(|| Ok::<_, String>(3)).unwrap();
    assert_eq!(value, 3);
    let err = grid
        .guard(|| Err::<(), _>(String::from("Error on sync put")))
        .unwrap_err();
    assert_eq!(err.error().to_string(), "Error on sync put");

    let view = grid.sorted_view().unwrap();
    let fetched = grid
        .track_error(|| Ok::<_, String>(view.fetch()))
        .await
        .unwrap();
    assert_eq!(fetched.records.len(), 3);

    assert_eq!(events.errors().len(), 1);
    let names = fetched
        .records
        .iter()
        .filter_map(|record| record.get("name").and_then(Value::as_str))
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Alice", "Bob", "Carol"]);
}
