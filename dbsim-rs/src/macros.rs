/// Wraps an async scenario fn into the boxed-future shape expected by
/// [`crate::ScenarioSpec`], so suites can be assembled from plain fn items.
#[macro_export]
macro_rules! dyn_scenario {
    (
        $( #[$attr:meta] )*
        $vis:vis async fn $name:ident<$lt:lifetime>( $($args:tt)* ) $body:block
    ) => {
        $( #[$attr] )*
        $vis fn $name<$lt>( $($args)* ) -> ::std::pin::Pin<::std::boxed::Box<
            dyn ::std::future::Future<Output = $crate::errors::Result<()>>
                + ::std::marker::Send
                + $lt,
        >> {
            ::std::boxed::Box::pin(async move $body)
        }
    };
}
