// Column names follow the on-disk schema shared with existing logger databases,
// so the camelCase ones are mapped through `sql_name`.

diesel::table! {
    groupings (grouping_id) {
        grouping_id -> Integer,
        #[sql_name = "groupingPrettyName"]
        grouping_pretty_name -> Nullable<Text>,
        #[sql_name = "groupingShortName"]
        grouping_short_name -> Nullable<Text>,
        #[sql_name = "isGroupingActiveBool"]
        is_grouping_active -> Nullable<Integer>,
    }
}

diesel::table! {
    sensors (sensor_id) {
        #[sql_name = "sensorID"]
        sensor_id -> Text,
        #[sql_name = "sensorPrettyName"]
        sensor_pretty_name -> Nullable<Text>,
        #[sql_name = "sensorShortName"]
        sensor_short_name -> Nullable<Text>,
        #[sql_name = "isSensorActiveBool"]
        is_sensor_active -> Nullable<Integer>,
        grouping_id -> Integer,
        flow1_return0 -> Nullable<Integer>,
        #[sql_name = "calibrationCorrection"]
        calibration_correction -> Nullable<Double>,
    }
}

diesel::table! {
    temperature_data (data_id) {
        data_id -> BigInt,
        #[sql_name = "syncTimestamp"]
        sync_timestamp -> Nullable<BigInt>,
        timestamp -> Nullable<Double>,
        #[sql_name = "sensorID"]
        sensor_id -> Text,
        #[sql_name = "tempDegC"]
        temp_deg_c -> Nullable<Double>,
    }
}

diesel::joinable!(sensors -> groupings (grouping_id));
diesel::joinable!(temperature_data -> sensors (sensor_id));

diesel::allow_tables_to_appear_in_same_query!(groupings, sensors, temperature_data);
