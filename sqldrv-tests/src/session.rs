use sqldrv::{Connection, Context, NamedValue, Value};

pub async fn session<C: Connection>(connection: &mut C) {
    let ctx = Context::background();
    connection.ping(&ctx).await.expect("Could not ping");
    connection
        .reset_session(&ctx)
        .await
        .expect("Could not reset the session");
    let mut value = NamedValue::named("anything", 1, Value::Blob(Some([0u8; 3].into())));
    connection
        .check_named_value(&mut value)
        .expect("Every argument must be accepted");
    assert_eq!(value.value, Value::Blob(Some([0u8; 3].into())));
    connection
        .ping(&ctx)
        .await
        .expect("Could not ping after the reset");
}
