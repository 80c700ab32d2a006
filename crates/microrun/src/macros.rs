/// Declares a service once and generates both sides of it.
///
/// ```ignore
/// microrun::service! {
///     /// Greets people.
///     pub trait Greeter: "Greeter" {
///         client GreeterClient;
///         provider GreeterProvider;
///
///         fn greet(name: String) -> String;
///     }
/// }
/// ```
///
/// expands to:
///
/// - `trait Greeter`: the server-side trait, with `async fn greet(&self, name: String)
///   -> Result<String, ProviderError>`. Implement it with `#[microrun::async_trait]`.
/// - `struct GreeterClient`: a typed stub with `async fn greet(&self, name: &str)`.
///   Obtain one with `RpcAccessPoint::get_remote_service`.
/// - `struct GreeterProvider<T>`: adapts any `T: Greeter` into a `ServiceProvider` that
///   dispatches by wire method name.
///
/// The string after the trait name is the interface name used on the wire.
#[macro_export]
macro_rules! service {
    (
        $(#[$meta:meta])*
        $vis:vis trait $name:ident : $wire:literal {
            client $client:ident;
            provider $provider:ident;

            $(
                $(#[$mmeta:meta])*
                fn $method:ident ( $arg:ident : String ) -> String;
            )*
        }
    ) => {
        $(#[$meta])*
        #[$crate::async_trait]
        $vis trait $name: Send + Sync + 'static {
            $(
                $(#[$mmeta])*
                async fn $method(&self, $arg: String)
                    -> ::std::result::Result<String, $crate::provider::ProviderError>;
            )*
        }

        #[derive(Clone)]
        $vis struct $client {
            stub: $crate::stub::Stub,
        }

        impl $client {
            /// Interface name on the wire.
            pub const NAME: &'static str = $wire;

            $(
                $(#[$mmeta])*
                pub async fn $method(&self, $arg: &str) -> $crate::stub::Result<String> {
                    self.stub.invoke(stringify!($method), $arg).await
                }
            )*
        }

        impl $crate::stub::RemoteService for $client {
            fn interface() -> $crate::stub::ServiceInterface {
                $crate::stub::ServiceInterface::new($wire)
                    $( .with_method($crate::stub::MethodSignature::unary(stringify!($method))) )*
            }

            fn from_stub(stub: $crate::stub::Stub) -> Self {
                Self { stub }
            }
        }

        $vis struct $provider<T: ?Sized>(pub ::std::sync::Arc<T>);

        impl<T: $name> $provider<T> {
            pub fn new(inner: T) -> Self {
                Self(::std::sync::Arc::new(inner))
            }
        }

        #[$crate::async_trait]
        impl<T: $name + ?Sized> $crate::provider::ServiceProvider for $provider<T> {
            async fn invoke(
                &self,
                method: &str,
                argument: String,
            ) -> ::std::result::Result<String, $crate::provider::ProviderError> {
                $(
                    if method == stringify!($method) {
                        return self.0.$method(argument).await;
                    }
                )*
                Err(::std::boxed::Box::new($crate::provider::Error::UnknownMethod(method.to_string())))
            }
        }
    };
}
