use axum::{http::StatusCode, BoxError};
use futures::{Stream, TryStreamExt};
use std::io;
use std::path::Path;
use tokio::{fs::File, io::BufWriter};
use tokio_util::io::StreamReader;

/// Save a `Stream` to a file. A partially written file is removed on error.
pub async fn stream_to_file<S, E>(path: &Path, stream: S) -> Result<u64, (StatusCode, String)>
where
    S: Stream<Item = Result<axum::body::Bytes, E>>,
    E: Into<BoxError>,
{
    let written = async {
        let body_with_io_error = stream.map_err(|err| io::Error::new(io::ErrorKind::Other, err));
        let body_reader = StreamReader::new(body_with_io_error);
        futures::pin_mut!(body_reader);

        let mut file = BufWriter::new(File::create(path).await?);
        let written = tokio::io::copy(&mut body_reader, &mut file).await?;
        tokio::io::AsyncWriteExt::flush(&mut file).await?;

        Ok::<_, io::Error>(written)
    }
    .await;

    match written {
        Ok(written) => Ok(written),
        Err(err) => {
            let _ = tokio::fs::remove_file(path).await;
            Err((StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))
        }
    }
}
