use std::sync::Arc;

use rowsync::{
    Column, EventKind, Grid, GridConfig, MemoryCollection, MemoryRenderer, RecordId,
    SortCriterion,
};
use serde_json::{json, Value};
use tracing::Level;

fn print_rows(title: &str, renderer: &MemoryRenderer) {
    println!("\n{}", title);
    for (index, id) in renderer.rendered_ids().iter().enumerate() {
        let Some(id) = id else { continue };
        let Some(handle) = rowsync::Renderer::find_row(renderer, id) else {
            continue;
        };
        if let Some(node) = renderer.node(handle) {
            println!("{}: {}", index, Value::from(node.record));
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let counters = MemoryCollection::from_values([
        json!({ "id": 1, "name": "first", "count": 0 }),
        json!({ "id": 2, "name": "second", "count": 10 }),
        json!({ "id": 3, "name": "third", "count": 5 }),
        json!({ "id": 4, "name": "fourth", "count": 15 }),
    ])?;
    let renderer = Arc::new(MemoryRenderer::new());

    let config = GridConfig {
        name: "counters".to_string(),
        no_data_message: "No counters".to_string(),
        ..GridConfig::default()
    };
    let grid = Grid::builder(renderer.clone())
        .config(config)
        .collection(Arc::new(counters.clone()))
        .columns(vec![
            Column::new("name").setter(|record| {
                let name = record.get("name")?.as_str()?.trim().to_string();
                Some(Value::from(name))
            }),
            Column::new("count"),
        ])
        .build()
        .await;
    let _errors = grid.emitter().listen(|event| {
        if let EventKind::Error(error) = &event.kind {
            println!("grid reported: {}", error);
        }
    });
    print_rows("Sorted by key", &renderer);

    grid.set_sort(vec![SortCriterion::descending("count")]).await?;
    print_rows("Sorted by count", &renderer);

    grid.update_dirty(3u64, "count", 50);
    grid.update_dirty(3u64, "name", "  third, edited  ");
    grid.refresh(Default::default()).await?;
    print_rows("With local edits", &renderer);

    grid.save().await?;
    println!("\nSaved: {:?}", counters.record(&RecordId::from("3")));
    print_rows("After save", &renderer);

    counters.remove(&RecordId::from("4"));
    print_rows("After removing fourth", &renderer);

    grid.destroy();
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .pretty()
        .with_max_level(Level::DEBUG)
        .with_writer(std::io::stdout)
        .init();

    if let Err(err) = run().await {
        eprintln!("{:#}", err);
    }
}
