use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::dispatcher::OperationDispatcher;
use super::types::{BoxedSink, DriverProps, FileObject, LinkResource, RangeSpec, UploadRequest};
use super::{Driver, DriverConstructor};
use crate::bootstrap;
use crate::config::{ConnectionMode, DriverConfig, FormField, form_meta};
use crate::context::OpContext;
use crate::errors::DriverError;
use crate::logging::init_tracing;
use crate::net::{Dialer, TcpDialer};
use crate::pool::{
    DualPoolManager, Endpoint, FtpSessionFactory, PoolSizing, SessionProvider, SharedSession,
};
use crate::protocol::Connector;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const DRIVER_NAME: &str = "FTP-Plug";

// -----------------------------------------------------------------------------
// ----- FtpDriver -------------------------------------------------------------

type Factory<C, D> = FtpSessionFactory<C, D>;
type Provider<C, D> = dyn SessionProvider<Factory = Factory<C, D>>;

/// FTP storage driver. Inert until [`Driver::init`] succeeds.
pub struct FtpDriver<C: Connector, D: Dialer + ?Sized = TcpDialer> {
    connector: Arc<C>,
    dialer: Arc<D>,
    state: Option<Ready<C, D>>,
}

struct Ready<C: Connector, D: Dialer + ?Sized> {
    root: FileObject,
    dispatcher: OperationDispatcher<Provider<C, D>>,
}

// -----------------------------------------------------------------------------
// ----- FtpDriver: Static -----------------------------------------------------

impl<C: Connector> FtpDriver<C, TcpDialer> {
    pub fn with_tcp(connector: Arc<C>) -> Self {
        Self::new(connector, Arc::new(TcpDialer))
    }
}

impl<C: Connector, D: Dialer + ?Sized> FtpDriver<C, D> {
    pub fn new(connector: Arc<C>, dialer: Arc<D>) -> Self {
        Self {
            connector,
            dialer,
            state: None,
        }
    }
}

/// A constructor value the host registers; every call yields a fresh,
/// uninitialized driver sharing the same connector and dialer.
pub fn ftp_driver_constructor<C, D>(connector: Arc<C>, dialer: Arc<D>) -> DriverConstructor
where
    C: Connector,
    D: Dialer + ?Sized,
{
    Arc::new(move || Box::new(FtpDriver::new(connector.clone(), dialer.clone())) as Box<dyn Driver>)
}

// -----------------------------------------------------------------------------
// ----- FtpDriver: Public -----------------------------------------------------

impl<C: Connector, D: Dialer + ?Sized> FtpDriver<C, D> {
    pub fn is_ready(&self) -> bool {
        self.state.is_some()
    }

    pub fn dispatcher(&self) -> Result<&OperationDispatcher<Provider<C, D>>, DriverError> {
        self.ready().map(|ready| &ready.dispatcher)
    }
}

// -----------------------------------------------------------------------------
// ----- FtpDriver: Private ----------------------------------------------------

impl<C: Connector, D: Dialer + ?Sized> FtpDriver<C, D> {
    fn ready(&self) -> Result<&Ready<C, D>, DriverError> {
        self.state.as_ref().ok_or(DriverError::NotInitialized)
    }

    async fn build(&self, ctx: &OpContext, config: &DriverConfig) -> Result<Ready<C, D>, DriverError> {
        config.validate()?;
        let address = bootstrap::resolve_address(&config.address)?;

        let endpoint = Endpoint::new(address.clone(), config.username.clone(), config.password.clone());
        let factory = Arc::new(FtpSessionFactory::new(
            endpoint,
            self.connector.clone(),
            self.dialer.clone(),
            config.connect_timeout,
        ));

        let provider: Arc<Provider<C, D>> = match config.connection_mode {
            ConnectionMode::Pool => {
                let sizing = PoolSizing {
                    general: config.general_pool_size,
                    download: config.download_pool_size,
                    max_wait: config.borrow_timeout,
                };
                Arc::new(DualPoolManager::init(factory, &sizing, ctx).await?)
            }
            ConnectionMode::Single => {
                Arc::new(SharedSession::init(factory, config.borrow_timeout, ctx).await?)
            }
        };

        info!(
            "ftp driver ready: address={address} mode={:?} encoding={}",
            config.connection_mode,
            config.charset.name()
        );

        Ok(Ready {
            root: FileObject::folder(config.root_folder_path.as_str()),
            dispatcher: OperationDispatcher::new(provider, config.charset),
        })
    }
}

// -----------------------------------------------------------------------------
// ----- Driver ----------------------------------------------------------------

#[async_trait]
impl<C, D> Driver for FtpDriver<C, D>
where
    C: Connector,
    D: Dialer + ?Sized,
{
    fn props(&self) -> DriverProps {
        DriverProps {
            name: DRIVER_NAME,
            only_proxy: true,
            no_cache: true,
            read_mostly: true,
        }
    }

    fn form_meta(&self) -> Vec<FormField> {
        form_meta()
    }

    async fn init(&mut self, ctx: &OpContext, config: DriverConfig) -> Result<(), DriverError> {
        init_tracing(config.log_level);

        if self.state.is_some() {
            warn!("ftp driver re-initialized; closing previous sessions");
            self.teardown(ctx).await?;
        }

        let ready = self.build(ctx, &config).await?;
        self.state = Some(ready);
        Ok(())
    }

    async fn teardown(&mut self, ctx: &OpContext) -> Result<(), DriverError> {
        if let Some(ready) = self.state.take() {
            ready.dispatcher.provider().shutdown(ctx).await;
            info!("ftp driver shut down");
        }
        Ok(())
    }

    fn root(&self) -> Result<FileObject, DriverError> {
        self.ready().map(|ready| ready.root.clone())
    }

    async fn list(&self, ctx: &OpContext, dir: &FileObject) -> Result<Vec<FileObject>, DriverError> {
        self.ready()?.dispatcher.list(ctx, dir).await
    }

    async fn link(&self, _ctx: &OpContext, file: &FileObject) -> Result<LinkResource, DriverError> {
        Ok(self.ready()?.dispatcher.link(file))
    }

    async fn link_range(
        &self,
        ctx: &OpContext,
        file: &FileObject,
        range: RangeSpec,
        mut sink: BoxedSink,
    ) -> Result<u64, DriverError> {
        let ready = match self.ready() {
            Ok(ready) => ready,
            Err(err) => {
                // the sink is ours to close on every path
                let _ = tokio::io::AsyncWriteExt::shutdown(&mut sink).await;
                return Err(err);
            }
        };
        ready.dispatcher.range_read(ctx, file, range, sink).await
    }

    async fn make_dir(
        &self,
        ctx: &OpContext,
        parent: &FileObject,
        name: &str,
    ) -> Result<FileObject, DriverError> {
        self.ready()?.dispatcher.make_dir(ctx, parent, name).await
    }

    async fn move_to(
        &self,
        ctx: &OpContext,
        src: &FileObject,
        dst_dir: &FileObject,
    ) -> Result<FileObject, DriverError> {
        self.ready()?.dispatcher.move_to(ctx, src, dst_dir).await
    }

    async fn rename(
        &self,
        ctx: &OpContext,
        src: &FileObject,
        new_name: &str,
    ) -> Result<FileObject, DriverError> {
        self.ready()?.dispatcher.rename(ctx, src, new_name).await
    }

    async fn copy(
        &self,
        _ctx: &OpContext,
        src: &FileObject,
        dst_dir: &FileObject,
    ) -> Result<FileObject, DriverError> {
        match &self.state {
            Some(ready) => ready.dispatcher.copy(src, dst_dir),
            None => Err(DriverError::Unsupported(crate::errors::Operation::Copy)),
        }
    }

    async fn remove(&self, ctx: &OpContext, obj: &FileObject) -> Result<(), DriverError> {
        self.ready()?.dispatcher.remove(ctx, obj).await
    }

    async fn put(
        &self,
        ctx: &OpContext,
        dst_dir: &FileObject,
        upload: UploadRequest,
    ) -> Result<FileObject, DriverError> {
        self.ready()?.dispatcher.put(ctx, dst_dir, upload).await
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
