use std::{pin::Pin, sync::Arc, time::SystemTime};

use futures::{Stream, StreamExt};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

impl<T> Envelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            received_at: SystemTime::now(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error("transform error: {0}")]
    Transform(String),
    #[error("sink error: {0}")]
    Sink(String),
}

pub type ItemStream<T> = Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(&self) -> ItemStream<T>;
}

#[async_trait::async_trait]
pub trait Transform<I, O>: Send + Sync {
    async fn apply(&self, input: Envelope<I>) -> Result<Envelope<O>, PipelineError>;
}

/// Sinks receive upstream errors as items and decide whether to stop.
#[async_trait::async_trait]
pub trait Sink<T>: Send + Sync {
    async fn run<S>(&self, input: S) -> Result<(), PipelineError>
    where
        S: Stream<Item = Result<Envelope<T>, PipelineError>> + Send + Unpin + 'static;
}

pub struct Pipeline<S, T, K> {
    pub source: S,
    pub transforms: Vec<Arc<dyn Transform<T, T> + Send + Sync>>, // applied in order, per item
    pub sink: K,
}

impl<T, S, K> Pipeline<S, T, K>
where
    T: Send + 'static,
    S: Source<T> + Send + Sync + 'static,
    K: Sink<T> + Send + Sync + 'static,
{
    pub async fn run(self) -> Result<(), PipelineError> {
        let mut stream = self.source.stream().await;

        for t in self.transforms {
            stream = Box::pin(stream.then(move |item| {
                let t = t.clone();
                async move {
                    match item {
                        Ok(env) => t.apply(env).await,
                        Err(e) => Err(e),
                    }
                }
            }));
        }

        self.sink.run(stream).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    struct Numbers(Vec<Result<i32, &'static str>>);

    #[async_trait::async_trait]
    impl Source<i32> for Numbers {
        async fn stream(&self) -> ItemStream<i32> {
            let items: Vec<_> = self
                .0
                .iter()
                .copied()
                .map(|r| r.map(Envelope::new).map_err(|e| PipelineError::Source(e.to_string())))
                .collect();
            Box::pin(futures::stream::iter(items))
        }
    }

    struct Double;

    #[async_trait::async_trait]
    impl Transform<i32, i32> for Double {
        async fn apply(&self, input: Envelope<i32>) -> Result<Envelope<i32>, PipelineError> {
            if input.payload < 0 {
                return Err(PipelineError::Transform("negative".to_string()));
            }
            Ok(Envelope {
                payload: input.payload * 2,
                received_at: input.received_at,
            })
        }
    }

    struct Collect(Arc<Mutex<Vec<Result<i32, String>>>>);

    #[async_trait::async_trait]
    impl Sink<i32> for Collect {
        async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
        where
            S: Stream<Item = Result<Envelope<i32>, PipelineError>> + Send + Unpin + 'static,
        {
            while let Some(item) = input.next().await {
                self.0.lock().await.push(item.map(|e| e.payload).map_err(|e| e.to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn transforms_chain_and_errors_pass_through() {
        let out = Arc::new(Mutex::new(Vec::new()));
        let pipeline: Pipeline<_, i32, _> = Pipeline {
            source: Numbers(vec![Ok(1), Err("bad row"), Ok(-3), Ok(5)]),
            transforms: vec![Arc::new(Double), Arc::new(Double)],
            sink: Collect(out.clone()),
        };
        pipeline.run().await.unwrap();

        let got = out.lock().await.clone();
        assert_eq!(
            got,
            vec![
                Ok(4),
                Err("source error: bad row".to_string()),
                Err("transform error: negative".to_string()),
                Ok(20),
            ]
        );
    }
}
