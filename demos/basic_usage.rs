// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A small kanban board kept in an MVCC store.
//!
//! Moves a card between columns in a transaction, lists the board in both
//! scan directions, then reopens a persistent store over the same raw data.

use futures_util::TryStreamExt;
use mvcc_kv::impls::memory::MemoryStore;
use mvcc_kv::impls::persistent::MemoryRawStore;
use mvcc_kv::impls::persistent::PersistentStore;
use mvcc_kv::Backend;
use mvcc_kv::Condition;
use mvcc_kv::ConditionSpec;
use mvcc_kv::Config;
use mvcc_kv::KvError;
use mvcc_kv::Mvcc;

async fn move_card<B: Backend>(db: &Mvcc<B>, card: &str, from: &str, to: &str) -> Result<(), KvError> {
    let src = format!("col/{}/{}", from, card);
    let dst = format!("col/{}/{}", to, card);

    db.transact(move |tx| {
        let src = src.clone();
        let dst = dst.clone();
        Box::pin(async move {
            let Some(title) = tx.get(src.as_bytes()).await? else {
                return Ok(());
            };
            tx.delete(src)?;
            tx.put(dst, title)?;
            Ok::<_, KvError>(())
        })
    })
    .await
}

async fn print_board<B: Backend>(db: &Mvcc<B>, condition: Condition) -> Result<(), KvError> {
    let rows = db
        .snapshot(move |snap| {
            Box::pin(async move {
                let rows: Vec<_> = snap.query(condition).await?.try_collect().await?;
                Ok::<_, KvError>((snap.read_version(), rows))
            })
        })
        .await?;

    let (version, rows) = rows;
    println!("board at version {}:", version);
    for (k, v) in rows {
        println!("  {} = {}", String::from_utf8_lossy(&k), String::from_utf8_lossy(&v));
    }
    Ok(())
}

async fn populate<B: Backend>(db: &Mvcc<B>) -> Result<(), KvError> {
    db.transact(|tx| {
        Box::pin(async move {
            tx.put("col/todo/1", "write docs")?;
            tx.put("col/todo/2", "fix login")?;
            tx.put("col/doing/3", "review")?;
            Ok::<_, KvError>(())
        })
    })
    .await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let db = Mvcc::new(MemoryStore::new(), Config::default());
    populate(&db).await?;
    move_card(&db, "1", "todo", "doing").await?;

    print_board(&db, Condition::gte("col/")).await?;

    // Conditions may also come from a loosely typed request.
    let spec: ConditionSpec = ConditionSpec {
        lt: Some(b"col/todo/~".to_vec()),
        ..Default::default()
    };
    print_board(&db, Condition::try_from(spec)?).await?;

    println!("stats: {:?}", db.stats().await?);
    db.close("demo finished").await?;

    // The persistent adapter keeps everything in a raw ordered store.
    let raw = MemoryRawStore::new();

    let db = Mvcc::new(PersistentStore::open(raw.clone(), Config::default()).await?, Config::default());
    populate(&db).await?;
    move_card(&db, "2", "todo", "done").await?;
    db.close("restart").await?;

    let db = Mvcc::new(PersistentStore::open(raw.clone(), Config::default()).await?, Config::default());
    print_board(&db, Condition::gte("col/")).await?;
    println!("raw rows: {}", raw.len());

    Ok(())
}
